//! Scripted in-memory engine for unit tests.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

use std::path::Path;

use super::dispatcher::Dispatcher;
use super::queue::CommandQueue;
use super::session::Session;
use super::workspace::Workspace;
use crate::channel::ProcessChannel;

/// Expected input lines, each with the output chunks written in reply.
pub(crate) type Script = Vec<(&'static str, Vec<&'static str>)>;

/// A fake engine that expects each line in turn and answers with the
/// given chunks, then hangs up.
pub(crate) fn scripted_engine(script: Script) -> Dispatcher {
    let (near, far) = duplex(64 * 1024);
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(far);
        let mut lines = BufReader::new(read).lines();
        for (expected, chunks) in script {
            let Ok(Some(line)) = lines.next_line().await else {
                return;
            };
            assert_eq!(line, expected);
            for chunk in chunks {
                write.write_all(chunk.as_bytes()).await.unwrap();
                write.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        }
    });
    let catalog = crate::platform::mapdl::profile().unwrap().catalog;
    Dispatcher::new(ProcessChannel::from_stream(near), catalog)
}

/// A session over [`scripted_engine`], running in the existing directory `dir`.
pub(crate) async fn scripted_session(dir: &Path, script: Script) -> Session {
    let workspace = Workspace::existing(dir).unwrap();
    let queue = CommandQueue::create(workspace.path()).await.unwrap();
    Session::new(
        scripted_engine(script),
        queue,
        workspace,
        "scripted".to_string(),
        None,
        crate::platform::mapdl::profile().unwrap(),
    )
}
