mod support;

use std::collections::HashMap;
use std::path::PathBuf;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tessera::infra::telemetry;

use support::{Harness, address};

#[tokio::test]
async fn refresh_emits_compile_eviction_and_prune_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let harness = Harness::new();
    let piece = harness.pieces.seed_piece("footer", "(c)").await;
    harness.pieces.seed_location(piece.id, "site", "home").await;
    harness.pieces.seed_location(piece.id, "site", "broken").await;
    harness
        .cache
        .put(
            address("site", "home"),
            vec![PathBuf::from("/cache/site/home.0123456789abcdef.html")],
        )
        .await;
    harness.compiler.fail_for(address("site", "broken")).await;

    harness.service.refresh_piece(&piece).await.expect("refresh");

    let counters: HashMap<String, u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    assert_eq!(counters.get("tessera_view_compile_total"), Some(&2));
    assert_eq!(counters.get("tessera_view_compile_failed_total"), Some(&1));
    assert_eq!(counters.get("tessera_view_cache_evicted_total"), Some(&1));
    assert_eq!(counters.get("tessera_piece_location_pruned_total"), Some(&1));
}
