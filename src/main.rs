//! Demo: experimento de juguete (`lr` x `data.csv` -> `train` -> `model.bin`)
//! grabado con commit / peek / fork sobre el store y el control de versiones
//! en memoria.
use std::fs;

use anyhow::Result;
use log::info;
use provflow::core::model::{Action, Resource};
use provflow::{ExecutionPhase, ExperimentConfig, ExperimentGraph, InMemoryGraphStore, InMemoryVersionControl,
               ProvenanceRecorder};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .init();

    let run_dir = std::env::temp_dir().join("provflow-demo");
    fs::create_dir_all(&run_dir)?;
    fs::write(run_dir.join("data.csv"), "x,y\n0,1\n1,3\n")?;

    let mut graph = ExperimentGraph::new();
    let lr = graph.register_node(Resource::literal_each("lr", [0.01, 0.1]))?;
    let data = graph.register_node(Resource::artifact("data", "data.csv"))?;
    let train = graph.register_node(Action::new("train", [lr, data]))?;
    let model = graph.register_node(Resource::artifact("model", "model.bin").with_parent(train))?;
    graph.register_edge(lr, train)?;
    graph.register_edge(data, train)?;
    graph.register_edge(train, model)?;

    let cfg = ExperimentConfig::new("demo", "/virtual/provflow").with_run_dir(&run_dir);
    let mut rec = ProvenanceRecorder::new(cfg, InMemoryGraphStore::new(), InMemoryVersionControl::new(), graph);

    let first = rec.checkpoint("lr grid")?;
    let pre = rec.commit(ExecutionPhase::Pre)?;
    println!("commit {first}: seq={} bindings={}",
             pre.spec.tags.sequence_number,
             pre.bindings().count());

    let extra = rec.graph_mut().register_node(Resource::literal("momentum", 0.9))?;
    info!("added momentum as {extra}");
    rec.checkpoint("add momentum")?;
    rec.commit(ExecutionPhase::Pre)?;

    let fork = rec.fork(&first)?;
    println!("fork to {first}: seq={} starts={} previous latest={:?}",
             fork.spec.tags.sequence_number,
             fork.starts.len(),
             fork.previous_latest);

    // el "entrenamiento" escribe el modelo y una captura intermedia de lr
    fs::write(run_dir.join("model.bin"), [0u8, 1, 2, 3])?;
    fs::write(run_dir.join("ghost_literal_0.json"), "0.1")?;
    let peek = rec.peek("model.bin")?;
    println!("peek: actions={} outputs={} ghosts linked={}",
             peek.actions.len(),
             peek.outputs.len(),
             peek.ghosts.len());

    for version in rec.history()? {
        println!("  #{} {} seq={} {}",
                 version.version_id,
                 version.tags.phase,
                 version.tags.sequence_number,
                 version.tags.commit_hash);
    }
    for binding in rec.bindings_for("lr")? {
        println!("  lr = {} ({})", binding.value, binding.hash);
    }
    Ok(())
}
