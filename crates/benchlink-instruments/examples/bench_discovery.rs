use std::time::Duration;

use benchlink_core::config::BenchlinkConfig;
use benchlink_core::event::EventFilter;
use benchlink_core::types::{Identity, PropertyMap, Value};
use benchlink_instruments::adapters::SimAdapter;
use benchlink_instruments::driver::{DriverDescriptor, InstrumentDriver};
use benchlink_instruments::loader::DriverLoader;
use benchlink_instruments::registry::ResourceRegistry;

use async_trait::async_trait;
use tracing::info;

/// A toy multimeter driver for the simulated transport
#[derive(Debug)]
struct DemoMeterDriver;

#[async_trait]
impl InstrumentDriver for DemoMeterDriver {
    fn descriptor_id(&self) -> &str {
        "demo-meter"
    }

    async fn open(&self) -> benchlink_core::error::Result<()> {
        Ok(())
    }

    async fn close(&self) -> benchlink_core::error::Result<()> {
        Ok(())
    }

    async fn properties(&self) -> PropertyMap {
        let mut properties = PropertyMap::new();
        properties.insert("unit".to_string(), Value::String("volt".to_string()));
        properties.insert("range".to_string(), Value::Float(10.0));
        properties
    }

    fn commands(&self) -> Vec<String> {
        vec!["read_value".to_string()]
    }

    async fn invoke(
        &self,
        command: &str,
        _args: Vec<Value>,
    ) -> benchlink_core::error::Result<Value> {
        match command {
            "read_value" => Ok(Value::Float(4.217)),
            other => Err(benchlink_core::error::Error::UnknownCommand(
                other.to_string(),
                "demo-meter".to_string(),
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    benchlink_core::logging::init_with_filter("debug")?;

    // Startup-time driver registration table
    let mut loader = DriverLoader::new();
    loader.register(DriverDescriptor::new(
        "demo-meter",
        |identity: &Identity| identity.vendor == "DemoBench" && identity.model == "DMM100",
        |_binding| Ok(Box::new(DemoMeterDriver) as Box<dyn InstrumentDriver>),
    ))?;

    let registry = ResourceRegistry::new(BenchlinkConfig::default(), loader);

    // Log every registry event
    let _event_log = registry.events().subscribe_fn(EventFilter::all(), |event| {
        info!("event: {} for {}", event.kind, event.resource);
    });

    // Plug two instruments into a simulated transport
    let adapter = SimAdapter::new("sim0");
    adapter
        .attach_instrument("COM3", Identity::new("DemoBench", "DMM100").with_serial("S-1001"))
        .await;
    adapter
        .attach_instrument("COM7", Identity::new("DemoBench", "PSU20"))
        .await;

    registry
        .register_adapter_with_period(adapter.clone(), Duration::from_millis(500))
        .await?;
    registry.refresh(None).await?;

    for (id, snapshot) in registry.resources().await? {
        info!("resource {}: {:?}", id, snapshot);
    }

    // The meter matched exactly one descriptor and carries a driver
    let meters = registry
        .find_resources(|snapshot| {
            snapshot.get("driver").and_then(Value::as_str) == Some("demo-meter")
        })
        .await?;
    for id in &meters {
        let value = registry.invoke(*id, "read_value", Vec::new()).await?;
        info!("meter {} reads {:?}", id, value);
    }

    // Unplug everything and watch the registry reconcile
    adapter.clear().await;
    registry.refresh(None).await?;
    info!("resources after unplug: {}", registry.count()?);

    registry.shutdown().await;
    Ok(())
}
