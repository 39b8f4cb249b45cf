use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront_deferred::{Engine, Handler, Promise, QueueConfig, Resolution, TaskQueue};

/// Walks a catalog-style flow through the engine: a deferred category lookup,
/// a product fan-out with `all`, a recovered failure, and `always` cleanup.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("storefront_deferred=info".parse()?),
        )
        .init();

    info!("Deferred demo starting...");

    let config = QueueConfig::from_env()?;
    let queue = Rc::new(TaskQueue::with_config(config));
    let engine: Engine<Value> = Engine::with_scheduler(queue.clone());

    // Category arrives later, like a response from the catalog service.
    let category = engine.defer();
    let products = {
        let engine = engine.clone();
        category.promise().and_then(move |category| {
            let mut lookups: BTreeMap<String, Promise<Value>> = BTreeMap::new();
            if let Some(skus) = category["skus"].as_array() {
                for sku in skus.iter().filter_map(Value::as_str) {
                    lookups.insert(sku.to_string(), engine.resolved(json!({ "sku": sku })));
                }
            }
            Ok(engine.all(lookups).into())
        })
    };

    let basket = engine.when(
        Resolution::Value(json!({ "items": 2 })),
        Some(Handler::new(|basket| {
            Ok(Resolution::Value(json!({ "basket": basket, "checked": true })))
        })),
        None,
    );

    let page = engine
        .reject(json!("page not found"))
        .or_else(|reason| Ok(Resolution::Value(json!({ "fallback": reason }))))
        .always(|| {
            info!("Page lookup finished");
            Ok(Resolution::Value(Value::Null))
        });

    category.resolve(json!({ "id": "shoes", "skus": ["s-1", "s-2"] }));
    let ran = queue.run_until_idle()?;
    info!(tasks = ran, "Queue drained");

    let report = json!({
        "products": products.state(),
        "basket": basket.state(),
        "page": page.state(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
