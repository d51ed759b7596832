//! BLE client for the demo firmware's readings/setpoint service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

/// Service and characteristics registered by the demo firmware
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xab0828b1_198e_4351_b779_901fa0e0371e);
pub const READINGS_UUID: Uuid = Uuid::from_u128(0x4ac8a682_9736_4e5d_932b_e9b31405049c);
pub const SETPOINT_UUID: Uuid = Uuid::from_u128(0xe39c2c0e_6b0f_4e1f_9b5e_4a8a1c1c7e2d);

/// Client connected to one device.
pub struct BleClient {
    peripheral: Peripheral,
    readings: Characteristic,
    setpoint: Characteristic,
    /// Notified payloads, oldest first
    notifications: Arc<Mutex<Vec<String>>>,
}

impl BleClient {
    /// Scan for a device advertising the demo service and connect.
    pub async fn connect(scan_timeout: Duration) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;

        adapter
            .start_scan(ScanFilter {
                services: vec![SERVICE_UUID],
            })
            .await?;
        let peripheral = Self::find_device(&adapter, scan_timeout).await;
        adapter.stop_scan().await?;
        let peripheral = peripheral?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| anyhow!("Characteristic {} not found", uuid))
        };
        let readings = find(READINGS_UUID)?;
        let setpoint = find(SETPOINT_UUID)?;

        peripheral.subscribe(&readings).await?;

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = notifications.clone();
        let mut stream = peripheral.notifications().await?;
        tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if data.uuid == READINGS_UUID {
                    let text = String::from_utf8_lossy(&data.value).into_owned();
                    sink.lock().await.push(text);
                }
            }
        });

        Ok(Self {
            peripheral,
            readings,
            setpoint,
            notifications,
        })
    }

    /// Find the first device listing the demo service.
    async fn find_device(adapter: &Adapter, scan_timeout: Duration) -> Result<Peripheral> {
        let start = std::time::Instant::now();

        while start.elapsed() < scan_timeout {
            for peripheral in adapter.peripherals().await? {
                if let Some(props) = peripheral.properties().await? {
                    if props.services.contains(&SERVICE_UUID) {
                        return Ok(peripheral);
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Err(anyhow!("No device advertising {} within timeout", SERVICE_UUID))
    }

    /// Advertised local name, if the scan response carried one.
    pub async fn local_name(&self) -> Result<Option<String>> {
        Ok(self
            .peripheral
            .properties()
            .await?
            .and_then(|props| props.local_name))
    }

    /// Wait for the next notified readings payload.
    pub async fn next_reading(&self, wait: Duration) -> Result<String> {
        let result = timeout(wait, async {
            loop {
                {
                    let mut pending = self.notifications.lock().await;
                    if !pending.is_empty() {
                        return pending.remove(0);
                    }
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timeout waiting for readings notification"))
    }

    /// Read the readings value directly.
    pub async fn read_readings(&self) -> Result<String> {
        let value = self.peripheral.read(&self.readings).await?;
        Ok(String::from_utf8(value)?)
    }

    /// Write a raw setpoint payload.
    pub async fn write_setpoint(&self, payload: &str) -> Result<()> {
        self.peripheral
            .write(&self.setpoint, payload.as_bytes(), WriteType::WithResponse)
            .await?;
        Ok(())
    }

    /// Drop notifications that arrived so far.
    pub async fn clear_buffer(&self) {
        self.notifications.lock().await.clear();
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.unsubscribe(&self.readings).await?;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Parse a comma separated readings payload.
pub fn parse_values(payload: &str) -> Result<Vec<f32>> {
    payload
        .split(',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.trim()
                .parse::<f32>()
                .map_err(|_| anyhow!("Malformed value '{}' in '{}'", t, payload))
        })
        .collect()
}
