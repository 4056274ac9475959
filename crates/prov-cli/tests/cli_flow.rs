use std::path::Path;

use clap::Parser;
use prov_cli::{run, Cli};
use prov_core::model::Resource;
use prov_core::{ExperimentGraph, GitBackend};

fn prov(root: &Path, args: &[&str]) -> serde_json::Value {
    let dir = root.to_str().expect("utf8 tempdir");
    let mut argv = vec!["prov", "-e", "cli", "-d", dir];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).expect("argv");
    run(&cli).expect("command")
}

#[test]
fn init_commit_fork_through_the_cli() {
    if !GitBackend::new().available() {
        eprintln!("skip (git not on PATH)");
        return;
    }
    let root = tempfile::tempdir().expect("tempdir");
    let init = prov(root.path(), &["init"]);
    assert!(init["commit"].as_str().is_some());

    let mut graph = ExperimentGraph::new();
    graph.register_node(Resource::literal_each("alpha", [0.0, 0.5])).expect("alpha");
    graph.write_snapshot(&root.path().join("cli")).expect("write graph");
    let c1 = prov(root.path(), &["checkpoint", "-m", "alpha grid"])["commit"].as_str()
                                                                          .expect("hash")
                                                                          .to_string();

    let pre = prov(root.path(), &["commit", "--phase", "pre"]);
    assert_eq!(pre["spec"]["tags"]["sequence_number"], 0);

    let history = prov(root.path(), &["history"]);
    assert_eq!(history.as_array().expect("array").len(), 1);

    let fork = prov(root.path(), &["fork", "--commit", &c1]);
    assert_eq!(fork["spec"]["tags"]["sequence_number"], 1);

    let shown = prov(root.path(), &["show", "--literal", "alpha"]);
    assert_eq!(shown.as_array().expect("array").len(), 2);
    assert!(root.path().join(".provflow/cli.store.json").is_file());
}
