//! Blocking W3C WebDriver client.
//!
//! Talks plain HTTP + JSON to a chromedriver-compatible endpoint. Only the
//! commands the `PageDriver` trait needs are implemented.

use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};

use super::{DriverError, DriverResult, ElementHandle, PageDriver};

/// W3C element identifier key in command responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Cadence for `wait_visible` / `wait_stable` polling.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// HTTP timeout per WebDriver command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebDriverClient {
    http: Client,
    base: String,
    session_id: Option<String>,
    /// Root element of the last known stable document, used by `wait_stable`.
    stable_root: Option<String>,
}

impl WebDriverClient {
    /// Creates a browser session against a running WebDriver endpoint.
    pub fn connect(endpoint: &str, headless: bool, proxy_server: &str) -> DriverResult<Self> {
        let http = Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(DriverError::Http)?;

        let mut args = vec!["--disable-gpu".to_string()];
        if headless {
            args.push("--headless=new".to_string());
        }
        if !proxy_server.is_empty() {
            args.push(format!("--proxy-server={}", proxy_server));
        }

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-logging"],
                    },
                },
            },
        });

        let mut client = Self {
            http,
            base: endpoint.trim_end_matches('/').to_string(),
            session_id: None,
            stable_root: None,
        };

        log::info!("Creating browser session at {}", client.base);
        let value = client.raw_command(Method::POST, "/session", Some(capabilities))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Session("no sessionId in response".to_string()))?
            .to_string();
        client.session_id = Some(session_id);
        Ok(client)
    }

    /// Sends a command scoped to the current session.
    fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let session_id = self
            .session_id
            .as_ref()
            .ok_or_else(|| DriverError::Session("no active session".to_string()))?;
        let path = format!("/session/{}{}", session_id, path);
        self.raw_command(method, &path, body)
    }

    fn raw_command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method.clone(), &url);
        if method == Method::POST {
            // POST commands require a JSON body, even if empty.
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }
        let response = request.send()?;
        let status = response.status();
        let payload: Value = response.json()?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Err(Self::classify_error(&error, &message))
    }

    /// Maps a WebDriver error code onto the driver error taxonomy.
    fn classify_error(error: &str, message: &str) -> DriverError {
        match error {
            "no such element" | "stale element reference" => DriverError::NoSuchElement {
                selector: message.to_string(),
            },
            "timeout" | "script timeout" => DriverError::Timeout {
                what: message.to_string(),
                timeout: COMMAND_TIMEOUT,
            },
            _ => DriverError::Session(format!("{}: {}", error, message)),
        }
    }

    fn element_from_value(value: &Value, selector: &str) -> DriverResult<ElementHandle> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementHandle(id.to_string()))
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: selector.to_string(),
            })
    }

    fn elements_from_value(value: &Value, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        value
            .as_array()
            .ok_or_else(|| DriverError::Session("malformed elements response".to_string()))?
            .iter()
            .map(|v| Self::element_from_value(v, selector))
            .collect()
    }

    /// Id of the document root element, the staleness probe target.
    fn document_root(&mut self) -> DriverResult<String> {
        let element = self.find_element("html")?;
        Ok(element.0)
    }

    /// Re-records the document root after a known page transition.
    fn mark_stable(&mut self) {
        self.stable_root = self.document_root().ok();
    }
}

impl PageDriver for WebDriverClient {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn refresh(&mut self) -> DriverResult<()> {
        self.command(Method::POST, "/refresh", None)?;
        Ok(())
    }

    fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        self.find_elements(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: selector.to_string(),
            })
    }

    fn find_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let value = self.command(
            Method::POST,
            "/elements",
            Some(json!({ "using": "css selector", "value": selector })),
        )?;
        Self::elements_from_value(&value, selector)
    }

    fn find_from(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let value = self.command(
            Method::POST,
            &format!("/element/{}/elements", parent.0),
            Some(json!({ "using": "css selector", "value": selector })),
        )?;
        Self::elements_from_value(&value, selector)
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), None)?;
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.command(Method::POST, &format!("/element/{}/clear", element.0), None)?;
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.0),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.command(Method::GET, &format!("/element/{}/text", element.0), None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let value = self.command(
            Method::GET,
            &format!("/element/{}/attribute/{}", element.0, name),
            None,
        )?;
        Ok(value.as_str().map(str::to_string))
    }

    fn get_cookie(&mut self, name: &str) -> DriverResult<Option<String>> {
        match self.command(Method::GET, &format!("/cookie/{}", name), None) {
            Ok(value) => Ok(value
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string)),
            // Chromedriver reports a missing cookie as an error.
            Err(DriverError::Session(msg)) if msg.starts_with("no such cookie") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn wait_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_elements(selector)?.into_iter().next() {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    what: selector.to_string(),
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn wait_stable(&mut self, timeout: Duration) -> DriverResult<()> {
        let old_root = match self.stable_root.clone() {
            Some(root) => root,
            None => {
                self.mark_stable();
                return Ok(());
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            match self.document_root() {
                Ok(root) if root != old_root => {
                    self.stable_root = Some(root);
                    return Ok(());
                }
                // Mid-navigation the root lookup itself can fail; that
                // still means the old document is gone.
                Err(DriverError::NoSuchElement { .. }) => {
                    self.mark_stable();
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    what: "page transition".to_string(),
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn close(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            let path = format!("/session/{}", session_id);
            if let Err(e) = self.raw_command(Method::DELETE, &path, None) {
                log::warn!("Failed to delete browser session: {}", e);
            } else {
                log::info!("Browser session closed");
            }
        }
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        self.close();
    }
}
