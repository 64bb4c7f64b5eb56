//! MAPDL profile.
//!
//! Processor banners such as ` PREP7:` mark the end of every command.
//! Diagnostics are printed as `*** ERROR ***`, `*** WARNING ***` and
//! `*** NOTE ***` banners followed by their message and a blank line.

use crate::channel::{PatternCatalog, Severity};
use crate::platform::EngineProfile;

/// Processor prompts printed when the engine is ready for the next command.
const TERMINAL_PROMPT: &str =
    r"^\s*(?:BEGIN|PREP7|POST1|SOLU_LS\d+|POST26|AUX12|AUX15|AUX2|AUX3):\s*$";

/// Yes/no questions the automation cannot answer.
const CONFIRMATION_PROMPT: &str = r"(?i)[(\[]y/n[)\]]\s*\??\s*$";

/// Create the MAPDL profile.
pub fn profile() -> Result<EngineProfile, regex::Error> {
    let catalog = PatternCatalog::new()
        .with_terminal(TERMINAL_PROMPT)?
        .with_confirmation(CONFIRMATION_PROMPT)?
        .with_diagnostic(Severity::Error, r"\*\*\* ERROR \*\*\*")?
        .with_diagnostic(Severity::Warning, r"\*\*\* WARNING \*\*\*")?
        .with_diagnostic(Severity::Note, r"\*\*\* NOTE \*\*\*")?;

    Ok(EngineProfile::new("mapdl", catalog)
        .with_default_start_command("ansys150")
        .with_on_open_command("/PAGE,99999999,256,99999999,240")
        .with_on_open_command("/HEADER,OFF,OFF,OFF,OFF,ON,OFF")
        .with_on_open_command("/FORMAT,12,E,16,8")
        .with_on_open_command("/RGB,INDEX,100,100,100,0")
        .with_on_open_command("/RGB,INDEX,0,0,0,15")
        .with_on_close_command("finish")
        .with_on_close_command("/exit,nosav"))
}
