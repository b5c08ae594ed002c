// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-system smoke test through the facade: partition a dataset, run
//! the engine, and drive a differentially-private round over it.

use fedsim::engine::Resources;
use fedsim::partition::{DirichletPartitioner, InMemoryTable, Partitioner};
use fedsim::record::ConfigValue;
use fedsim::strategy::codec::{parameters_to_vecs, vecs_to_parameters};
use fedsim::strategy::compat::{fit_res_to_recordset, recordset_to_fit_ins};
use fedsim::strategy::compat::{evaluate_res_to_recordset, recordset_to_evaluate_ins};
use fedsim::strategy::{FitRes, EvaluateRes, MetricsMap, SimpleClientManager};
use fedsim::{
    ClientAppCallable, ClientAppRegistry, Context, DpServerFixedClipping, EngineConfig, FedAvg,
    InMemoryState, Message, MessageType, NodeContextRegistry, RoundDriver, ShutdownSignal,
    StateStore, VirtualClientEngine,
};
use std::sync::Arc;
use std::time::Duration;

/// A client that trains by stepping every parameter toward 1.0 and
/// remembers which partition it saw.
struct PartitionAwareApp {
    partitioner: Arc<DirichletPartitioner>,
}

impl ClientAppCallable for PartitionAwareApp {
    fn call(&self, message: Message, context: &mut Context) -> anyhow::Result<Message> {
        // The metadata node id is the partition index by the time the
        // message reaches the app.
        let partition_id = message.metadata.dst_node_id as usize;
        let rows = self.partitioner.load_partition(partition_id)?;
        anyhow::ensure!(!rows.is_empty(), "empty partition {partition_id}");

        let mut rec = fedsim::record::ConfigsRecord::new();
        rec.insert("partition", partition_id as i64);
        rec.insert("rows", rows.len() as i64);
        context.state.configs_records.insert("data.slice".into(), rec);

        match message.metadata.message_type {
            MessageType::Fit => {
                let ins = recordset_to_fit_ins(&message.content)?;
                let vecs = parameters_to_vecs(&ins.parameters)?;
                let trained: Vec<Vec<f32>> = vecs
                    .iter()
                    .map(|t| t.iter().map(|v| v + (1.0 - v) * 0.5).collect())
                    .collect();
                let res = FitRes {
                    parameters: vecs_to_parameters(&trained),
                    num_examples: rows.len() as u64,
                    metrics: MetricsMap::new(),
                };
                Ok(message.reply(fit_res_to_recordset(&res)))
            }
            MessageType::Evaluate => {
                let _ins = recordset_to_evaluate_ins(&message.content)?;
                let res = EvaluateRes {
                    loss: 1.0 / rows.len() as f64,
                    num_examples: rows.len() as u64,
                    metrics: MetricsMap::new(),
                };
                Ok(message.reply(evaluate_res_to_recordset(&res)))
            }
            other => anyhow::bail!("unsupported message type: {other}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dp_round_over_partitioned_data() {
    let num_nodes = 3;

    let labels = (0..60).map(|i| (i % 2).to_string()).collect();
    let table = InMemoryTable::new(60).with_column("label", labels).unwrap();
    let partitioner = Arc::new(
        DirichletPartitioner::new(Arc::new(table), num_nodes, 0.5, "label")
            .unwrap()
            .with_min_partition_size(5)
            .with_seed(13),
    );

    let state = Arc::new(InMemoryState::new());
    let contexts = Arc::new(NodeContextRegistry::new());

    let mut apps = ClientAppRegistry::new();
    let app_partitioner = Arc::clone(&partitioner);
    apps.register("demo.app", move || {
        Arc::new(PartitionAwareApp {
            partitioner: Arc::clone(&app_partitioner),
        }) as Arc<dyn ClientAppCallable>
    });

    let mut config = EngineConfig::new(num_nodes, "demo.app");
    config.resources = Resources {
        num_cpus: Some(2),
        cpus_per_actor: 1.0,
    };
    config.poll_interval_ms = 10;

    let engine = VirtualClientEngine::new(
        config,
        Arc::clone(&state) as Arc<dyn StateStore>,
        Arc::clone(&contexts),
        &apps,
    )
    .unwrap();
    engine.check_partitioner(partitioner.as_ref()).unwrap();
    let nodes = engine.node_ids().to_vec();

    let client_manager = Arc::new(SimpleClientManager::new(5));
    for node in &nodes {
        client_manager.register(*node);
    }

    // No noise: the round outcome stays deterministic up to clipping.
    let strategy = Arc::new(
        DpServerFixedClipping::new(
            FedAvg::new().with_initial_parameters(vecs_to_parameters(&[vec![0.0, 0.0]])),
            0.0,
            10.0,
            num_nodes as u64,
        )
        .unwrap(),
    );

    let shutdown = ShutdownSignal::new();
    let run = tokio::spawn(engine.run(shutdown.clone()));

    let mut driver = RoundDriver::new(
        strategy,
        Arc::clone(&state) as Arc<dyn StateStore>,
        client_manager,
        1,
    )
    .with_round_timeout(Duration::from_secs(5))
    .with_task_ttl(Duration::from_secs(5));

    let outcome = driver.run_round(1).await.unwrap();
    assert!(outcome.parameters_updated);
    assert_eq!(outcome.failures, 0);
    assert!(outcome.loss.is_some());

    // Every client moved halfway to 1.0; the clipping norm is far above
    // the update, so the mean is exactly 0.5 per element.
    let vecs = parameters_to_vecs(driver.parameters()).unwrap();
    assert_eq!(vecs, vec![vec![0.5, 0.5]]);

    shutdown.trigger();
    let metrics = run.await.unwrap();
    assert_eq!(metrics.completed, num_nodes as u64 * 2);
    assert_eq!(metrics.failed + metrics.expired, 0);

    // Each node recorded the partition slice it was bound to.
    for (idx, node) in nodes.iter().enumerate() {
        let ctx = contexts.retrieve_context(*node, 1);
        let slice = ctx.configs_records.get("data.slice").unwrap();
        assert_eq!(slice.get("partition"), Some(&ConfigValue::Int(idx as i64)));
    }
}
