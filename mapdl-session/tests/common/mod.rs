#![allow(dead_code)]

use std::path::Path;

use mapdl_session::{Session, SessionBuilder};

/// Path of the fake engine built alongside the tests.
pub fn mock_mapdl() -> &'static str {
    env!("CARGO_BIN_EXE_mock_mapdl")
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A builder for a mock session whose directory is generated under `base`.
pub fn builder(base: &Path) -> SessionBuilder {
    init_logging();
    Session::builder()
        .start_command(mock_mapdl())
        .base_dir(base)
        .cleanup(true)
}

/// A started mock session in PREP7 with nodes `1..=count` along X.
pub async fn session_with_nodes(base: &Path, count: usize) -> Session {
    let mut session = builder(base).build().await.expect("mock engine should start");
    let mut script = String::from("/prep7");
    for node in 1..=count {
        script.push_str(&format!("\nn,{node},{}.5,0,0", node - 1));
    }
    session.send(&script).await.expect("nodes should be created");
    session
}
