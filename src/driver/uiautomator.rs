//! uiautomator JSON-RPC driver
//!
//! Talks to the automation server running on the phone (the one installed
//! by the `uiautomator2` tooling) through a forwarded local port.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::adb::Adb;
use super::{Direction, DriverError, DriverResult, Locator, UiDriver};

// Selector field masks understood by the automation server
const MASK_TEXT: u32 = 0x01;
const MASK_TEXT_STARTS_WITH: u32 = 0x08;
const MASK_DESCRIPTION: u32 = 0x40;
const MASK_SCROLLABLE: u32 = 0x4000;
const MASK_FOCUSED: u32 = 0x02_0000;
const MASK_RESOURCE_ID: u32 = 0x20_0000;

/// Number of motion steps for swipe gestures
const SWIPE_STEPS: u32 = 10;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Build a server-side selector object from a locator
pub fn selector(locator: &Locator) -> Value {
    let mut mask = 0u32;
    let mut sel = json!({
        "childOrSibling": [],
        "childOrSiblingSelector": [],
    });

    if let Some(id) = &locator.resource_id {
        mask |= MASK_RESOURCE_ID;
        sel["resourceId"] = json!(id);
    }
    if let Some(text) = &locator.text {
        mask |= MASK_TEXT;
        sel["text"] = json!(text);
    }
    if let Some(prefix) = &locator.text_prefix {
        mask |= MASK_TEXT_STARTS_WITH;
        sel["textStartsWith"] = json!(prefix);
    }
    if let Some(desc) = &locator.description {
        mask |= MASK_DESCRIPTION;
        sel["description"] = json!(desc);
    }
    sel["mask"] = json!(mask);
    sel
}

fn flag_selector(mask: u32, field: &str) -> Value {
    let mut sel = json!({
        "mask": mask,
        "childOrSibling": [],
        "childOrSiblingSelector": [],
    });
    sel[field] = json!(true);
    sel
}

/// Driver backed by the on-device uiautomator server
pub struct Uiautomator2Driver {
    http: reqwest::Client,
    endpoint: String,
    adb: Adb,
    poll_interval: Duration,
    next_id: u64,
    display: Option<(i64, i64)>,
}

impl Uiautomator2Driver {
    pub fn new(adb: Adb, local_port: u16, poll_interval: Duration) -> DriverResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("http://127.0.0.1:{local_port}/jsonrpc/0"),
            adb,
            poll_interval,
            next_id: 0,
            display: None,
        })
    }

    async fn call(&mut self, method: &str, params: Value) -> DriverResult<Value> {
        self.next_id += 1;
        tracing::trace!(method, %params, "jsonrpc request");
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(format!("{method}: {e}")))?;

        if let Some(err) = body.error {
            return Err(DriverError::rpc(
                method,
                format!("{} (code {})", err.message, err.code),
            ));
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn call_bool(&mut self, method: &str, params: Value) -> DriverResult<bool> {
        let value = self.call(method, params).await?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::Protocol(format!("{method}: expected bool, got {value}")))
    }

    /// Device description reported by the automation server
    pub async fn device_info(&mut self) -> DriverResult<Value> {
        let info = self.call("deviceInfo", json!([])).await?;
        let width = info["displayWidth"].as_i64();
        let height = info["displayHeight"].as_i64();
        if let (Some(w), Some(h)) = (width, height) {
            self.display = Some((w, h));
        }
        Ok(info)
    }

    async fn display_size(&mut self) -> DriverResult<(i64, i64)> {
        if let Some(size) = self.display {
            return Ok(size);
        }
        self.device_info().await?;
        self.display
            .ok_or_else(|| DriverError::Protocol("deviceInfo has no display size".to_string()))
    }
}

#[async_trait]
impl UiDriver for Uiautomator2Driver {
    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        if self.call_bool("click", json!([selector(locator)])).await? {
            Ok(())
        } else {
            Err(DriverError::element_not_found(locator))
        }
    }

    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool> {
        self.call_bool("exist", json!([selector(locator)])).await
    }

    async fn get_text(&mut self, locator: &Locator) -> DriverResult<String> {
        let value = self.call("getText", json!([selector(locator)])).await?;
        match value {
            Value::String(text) => Ok(text),
            Value::Null => Err(DriverError::element_not_found(locator)),
            other => Err(DriverError::Protocol(format!("getText: expected string, got {other}"))),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn wait_for_appear(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<bool> {
        let millis = timeout.as_millis() as u64;
        self.call_bool("waitForExists", json!([selector(locator), millis]))
            .await
    }

    async fn wait_for_disappear(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> DriverResult<bool> {
        let millis = timeout.as_millis() as u64;
        self.call_bool("waitUntilGone", json!([selector(locator), millis]))
            .await
    }

    async fn scroll_to(&mut self, text: &str) -> DriverResult<()> {
        let container = flag_selector(MASK_SCROLLABLE, "scrollable");
        let target = selector(&Locator::text(text));
        if self
            .call_bool("scrollTo", json!([container, target, true]))
            .await?
        {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(format!("text={text:?}")))
        }
    }

    async fn swipe(&mut self, direction: Direction) -> DriverResult<()> {
        let (w, h) = self.display_size().await?;
        let (cx, cy) = (w / 2, h / 2);
        let (sx, sy, ex, ey) = match direction {
            Direction::Down => (cx, h / 5, cx, h * 4 / 5),
            Direction::Up => (cx, h * 4 / 5, cx, h / 5),
            Direction::Left => (w * 4 / 5, cy, w / 5, cy),
            Direction::Right => (w / 5, cy, w * 4 / 5, cy),
        };
        self.call("swipe", json!([sx, sy, ex, ey, SWIPE_STEPS]))
            .await
            .map(|_| ())
    }

    async fn clear_text(&mut self) -> DriverResult<()> {
        let focused = flag_selector(MASK_FOCUSED, "focused");
        self.call("clearTextField", json!([focused])).await.map(|_| ())
    }

    async fn send_text(&mut self, text: &str) -> DriverResult<()> {
        self.adb.input_text(text).await
    }

    async fn submit_text(&mut self) -> DriverResult<()> {
        self.call("pressKey", json!(["enter"])).await.map(|_| ())
    }

    async fn restart_app(&mut self, package: &str) -> DriverResult<()> {
        self.adb.restart_app(package).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_masks() {
        let sel = selector(&Locator::id("mosaic.base_text").with_text("Yes"));
        assert_eq!(sel["mask"], json!(MASK_RESOURCE_ID | MASK_TEXT));
        assert_eq!(sel["resourceId"], "mosaic.base_text");
        assert_eq!(sel["text"], "Yes");
        assert!(sel.get("description").is_none());
    }

    #[test]
    fn test_selector_prefix_and_description() {
        let sel = selector(&Locator::description("Delete").with_text_prefix("Del"));
        assert_eq!(sel["mask"], json!(MASK_DESCRIPTION | MASK_TEXT_STARTS_WITH));
        assert_eq!(sel["textStartsWith"], "Del");
        assert_eq!(sel["childOrSibling"], json!([]));
    }

    #[test]
    fn test_flag_selector() {
        let sel = flag_selector(MASK_SCROLLABLE, "scrollable");
        assert_eq!(sel["mask"], json!(0x4000));
        assert_eq!(sel["scrollable"], json!(true));
    }
}
