mod common;

use mapdl_session::error::ExtractError;
use mapdl_session::extract::{GetQuery, OUTPUT_FILE, calculate_skip_rows};
use mapdl_session::{Error, ListOptions, ScalarValue};

#[tokio::test]
async fn node_count_matches_created_nodes() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 4).await;

    let count = session.get(("node", "", "count")).await.unwrap();
    assert_eq!(count, ScalarValue::Integer(4));

    let x = session
        .get(GetQuery::new("node", "3", "loc").item1_index("x"))
        .await
        .unwrap();
    assert_eq!(x, ScalarValue::Float(2.5));

    let version = session.version().await.unwrap();
    assert_eq!(version.as_f64(), Some(15.0));
    session.close().await.unwrap();
}

#[tokio::test]
async fn query_without_value_is_an_extraction_error() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 1).await;

    // Leave a value behind, then ask for something that does not exist.
    session.get(("node", "", "count")).await.unwrap();
    let err = session
        .get(GetQuery::new("node", "42", "loc").item1_index("y"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Extract(ExtractError::NoValue { .. })));
    session.close().await.unwrap();
}

#[tokio::test]
async fn node_list_becomes_a_table() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 11).await;

    let table = session.get_list("nlist", &ListOptions::new()).await.unwrap();
    assert_eq!(table.columns().collect::<Vec<_>>(), vec!["NODE", "X", "Y", "Z"]);
    assert_eq!(table.len(), 11);
    assert_eq!(table.get(10, "NODE"), Some(&ScalarValue::Integer(11)));
    assert_eq!(table.get(2, "X").and_then(ScalarValue::as_f64), Some(2.5));

    let listing = session.working_dir().join(OUTPUT_FILE);
    assert_eq!(calculate_skip_rows(&listing, 5).unwrap(), 3);
    session.close().await.unwrap();
}

#[tokio::test]
async fn persisted_output_gets_its_own_file() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 2).await;

    let first = session.get_output("nlist", true).await.unwrap();
    let second = session.get_output("nlist", true).await.unwrap();
    let scratch = session.get_output("nlist", false).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(scratch.file_name().unwrap(), OUTPUT_FILE);
    for path in [&first, &second, &scratch] {
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("LIST ALL SELECTED NODES."));
    }
    // Output is back on the console once the listing is done.
    assert!(session.send("/com,visible").await.unwrap().contains("visible"));
    session.close().await.unwrap();
}

#[tokio::test]
async fn empty_listing_cannot_locate_data() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 0).await;

    // Redirecting a command with no output leaves an empty file.
    let err = session
        .get_list("/com", &ListOptions::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Extract(ExtractError::HeaderDetectionFailure { .. })),
        "{err:?}"
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn plots_are_written_to_the_working_directory() {
    let base = tempfile::tempdir().unwrap();
    let mut session = common::session_with_nodes(base.path(), 2).await;
    session.send("et,1,beam188\ne,1,2").await.unwrap();

    let first = session.plot(Some("eplot")).await.unwrap().unwrap();
    assert_eq!(first, session.working_dir().join("file000.jpg"));
    assert!(first.is_file());

    let again = session.plot(None).await.unwrap().unwrap();
    assert_eq!(again.file_name().unwrap(), "file001.jpg");

    // Without the JPEG device no file is reported.
    session.send("eplot").await.unwrap();
    assert!(!session.output().contains("WRITTEN TO FILE"));
    session.close().await.unwrap();
}
