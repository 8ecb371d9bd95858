//! 变更监听集成测试

mod common;

use std::time::Duration;

use interlinear::Channel;
use serde_json::json;

use common::{element_with_text, nth_tag, snapshot, HarnessBuilder};

/// 移除已标注元素会驱逐缓存，同样的文本在别处出现时重新请求翻译
#[tokio::test]
async fn test_removal_evicts_and_readd_translates_again() {
    let harness = HarnessBuilder::new(
        r#"<body><div id="a"><p>Hello world</p></div><div id="b"></div></body>"#,
    )
    .build()
    .await;
    let document = harness.document();
    let p = nth_tag(document, "p", 0);
    let target = nth_tag(document, "div", 1);

    harness.engine.annotate_pass().await;
    assert_eq!(harness.translator.calls(), 1);
    assert_eq!(harness.engine.cache().len(), 1);

    document.remove(&p);
    let summary = harness.engine.handle_mutations();
    assert_eq!(summary.evicted, 1);
    assert_eq!(summary.orphans_removed, 1);
    assert!(harness.engine.cache().is_empty());
    assert!(harness.annotations().is_empty());

    let fresh = element_with_text(document, "p", "Hello world");
    document.append_child(&target, &fresh);
    let summary = harness.engine.handle_mutations();
    assert!(summary.needs_rescan);

    harness.engine.annotate_pass().await;
    assert_eq!(harness.translator.calls(), 2);
    assert_eq!(harness.annotations().len(), 1);
}

/// 引擎自己插入的标注不会触发重扫
#[tokio::test]
async fn test_own_insertions_do_not_trigger_rescan() {
    let harness = HarnessBuilder::new("<body><p>Hello world</p><p>Second paragraph</p></body>")
        .build()
        .await;

    harness.engine.annotate_pass().await;
    let summary = harness.engine.handle_mutations();

    assert_eq!(summary.records, 2);
    assert!(!summary.needs_rescan);
    assert!(!harness.engine.watcher().is_scheduled());
}

/// 无关节点的新增不触发重扫
#[tokio::test]
async fn test_irrelevant_addition_is_ignored() {
    let harness = HarnessBuilder::new("<body><div id='feed'></div></body>")
        .build()
        .await;
    let feed = nth_tag(harness.document(), "div", 0);

    let span = element_with_text(harness.document(), "span", "Not a candidate");
    harness.document().append_child(&feed, &span);

    assert!(!harness.engine.handle_mutations().needs_rescan);
}

/// 引擎关闭时新增节点不触发重扫
#[tokio::test]
async fn test_disabled_engine_does_not_rescan() {
    let harness = HarnessBuilder::new("<body><div id='feed'></div></body>")
        .build()
        .await;
    harness
        .engine
        .apply_settings(snapshot(json!({ "enabled": false })), Channel::Push)
        .await;

    let feed = nth_tag(harness.document(), "div", 0);
    let p = element_with_text(harness.document(), "p", "Hello world");
    harness.document().append_child(&feed, &p);

    assert!(!harness.engine.handle_mutations().needs_rescan);
}

/// 一阵连续新增只触发一轮防抖后的标注
#[tokio::test(start_paused = true)]
async fn test_burst_of_additions_coalesces_into_one_pass() {
    let harness = HarnessBuilder::new("<body><p>Initial paragraph</p><div id='feed'></div></body>")
        .build()
        .await;
    let document = harness.document();
    let feed = nth_tag(document, "div", 0);

    let (result, _) = tokio::join!(
        harness.engine.run(tokio::time::sleep(Duration::from_secs(1))),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let first = element_with_text(document, "p", "First streamed paragraph");
            document.append_child(&feed, &first);

            tokio::time::sleep(Duration::from_millis(50)).await;
            let second = element_with_text(document, "p", "Second streamed paragraph");
            document.append_child(&feed, &second);
        }
    );

    assert!(result.is_ok());
    assert_eq!(harness.engine.pass_count(), 2);
    assert_eq!(harness.translator.calls(), 3);
    assert_eq!(harness.annotations().len(), 3);
}
