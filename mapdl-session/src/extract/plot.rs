//! Plot images written by the engine's JPEG device.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::driver::Session;
use crate::error::Result;

/// Message printed after the device writes an image.
static WRITTEN_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"WRITTEN TO FILE (\w*\.jpg)").expect("image file pattern is valid")
});

/// Command re-rendering the last plot.
const REPLOT: &str = "/REPLOT";

impl Session {
    /// Render `command` (or the last plot again) to a JPEG file in the working
    /// directory and return its path, or `None` if the engine reported no file.
    pub async fn plot(&mut self, command: Option<&str>) -> Result<Option<PathBuf>> {
        self.send("/SHOW,JPEG").await?;
        let result = self.send(command.unwrap_or(REPLOT)).await;
        self.send("/SHOW,CLOSE").await?;
        let response = result?;

        Ok(WRITTEN_FILE
            .captures(&response.output)
            .map(|captures| self.working_dir().join(&captures[1])))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::WRITTEN_FILE;
    use crate::driver::testing::scripted_session;

    #[test]
    fn test_written_file_pattern() {
        let captures = WRITTEN_FILE
            .captures(" JPEG WRITTEN TO FILE file012.jpg")
            .unwrap();
        assert_eq!(&captures[1], "file012.jpg");
        assert!(WRITTEN_FILE.captures(" PRODUCING ELEMENT PLOT").is_none());
    }

    #[tokio::test]
    async fn test_plot_returns_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(
            dir.path(),
            vec![
                ("/SHOW,JPEG", vec![" PREP7:\r\n"]),
                (
                    "eplot",
                    vec![" PRODUCING ELEMENT PLOT\r\n JPEG WRITTEN TO FILE file000.jpg\r\n PREP7:\r\n"],
                ),
                ("/SHOW,CLOSE", vec![" PREP7:\r\n"]),
            ],
        )
        .await;

        let path = assert_ok!(session.plot(Some("eplot")).await);
        assert_eq!(path, Some(dir.path().join("file000.jpg")));
    }

    #[tokio::test]
    async fn test_plot_without_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(
            dir.path(),
            vec![
                ("/SHOW,JPEG", vec![" BEGIN:\r\n"]),
                ("/REPLOT", vec![" NO PLOT TO REPLOT\r\n BEGIN:\r\n"]),
                ("/SHOW,CLOSE", vec![" BEGIN:\r\n"]),
            ],
        )
        .await;

        assert_eq!(assert_ok!(session.plot(None).await), None);
    }
}
