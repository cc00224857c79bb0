//! Login and booking routines against the booking site.
//!
//! A `Bot` owns the page driver session, the captcha solver, and the
//! configuration for its whole lifetime. Each routine is written as a
//! single attempt returning `Result<bool, AttemptError>`; the retry
//! controller in [`retry`] turns attempts into a bounded retry loop.

pub mod retry;

use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDateTime;
use image::DynamicImage;
use reqwest::header;
use thiserror::Error;

use crate::captcha::{CaptchaError, CaptchaModel, DecodeError};
use crate::config::BotConfig;
use crate::driver::{DriverError, ElementHandle, PageDriver};

// Selectors for the booking site (a ZK-framework UI).
const CAPTCHA_IMAGE: &str = ".z-bwcaptcha";
const LOGIN_INPUTS: &str = ".input-body-textbox";
const LOGIN_BUTTON: &str = ".z-button-os";
const BANNER_LABEL: &str = ".z-window-highlighted-cnt .z-label";
const BANNER_CONFIRM: &str = ".z-window-highlighted-cnt button.z-button-os";
const LISTING_TABLE: &str =
    ".z-tabpanel:not([style*='display:none']) .z-grid-body tbody.z-rows";
const LISTING_ROWS: &str = "tr.z-row";
const ROW_CELLS: &str = "td.z-row-inner";
const RESERVE_BUTTON: &str = "button";
const POPUP: &str = "div.z-window-popup";
const COMBO_INPUT: &str = "input.z-combobox-inp";
const COMBO_DROPDOWN: &str = "div.z-combobox-pp";
const COMBO_ITEMS: &str = "tr.z-comboitem";
const POPUP_SUBMIT: &str = "button.cssbtn1.z-button-os";

/// Session cookie forwarded when fetching the captcha image.
const SESSION_COOKIE: &str = "JSESSIONID";

/// Datetime format of the listing's "start ~ end" cell.
const TICKET_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
const REFRESH_TIMEOUT: Duration = Duration::from_secs(20);
const ELEMENT_TIMEOUT: Duration = Duration::from_secs(5);
const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Banner messages containing any of these are treated as rejections.
const FAILURE_MARKERS: &[&str] = &["失败", "失敗", "错误", "錯誤", "fail", "error"];

/// Classified failure of one routine attempt.
///
/// The first three kinds are recoverable and get retried; `Fatal` aborts
/// the whole run.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl AttemptError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AttemptError::Fatal(_))
    }
}

impl From<DriverError> for AttemptError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::NoSuchElement { selector } => AttemptError::ElementNotFound(selector),
            DriverError::Timeout { what, timeout } => {
                AttemptError::Timeout(format!("{} ({:?})", what, timeout))
            }
            other => AttemptError::Fatal(other.into()),
        }
    }
}

impl From<CaptchaError> for AttemptError {
    fn from(e: CaptchaError) -> Self {
        match e {
            // A bad class id can resolve on the next captcha image.
            CaptchaError::Decode(DecodeError::UnmappedClass(_)) => {
                AttemptError::Precondition(e.to_string())
            }
            CaptchaError::Inference(inner) => AttemptError::Fatal(inner),
        }
    }
}

/// Fetches the captcha image bytes out of band from the browser.
pub trait CaptchaFetcher {
    fn fetch(&self, url: &str, cookie: &str) -> Result<DynamicImage>;
}

/// `CaptchaFetcher` over a blocking HTTP client.
pub struct HttpCaptchaFetcher {
    client: reqwest::blocking::Client,
}

impl HttpCaptchaFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(IMAGE_FETCH_TIMEOUT)
                .build()?,
        })
    }
}

impl CaptchaFetcher for HttpCaptchaFetcher {
    fn fetch(&self, url: &str, cookie: &str) -> Result<DynamicImage> {
        let bytes = self
            .client
            .get(url)
            .header(header::COOKIE, cookie)
            .send()?
            .error_for_status()?
            .bytes()?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Read-only snapshot of one listing row.
///
/// `reserve_button` points into the live page and is invalidated by the
/// next navigation or refresh.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: String,
    pub name: String,
    pub initiator: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub reserve_button: ElementHandle,
}

/// Parses a `"start ~ end"` listing cell into its two datetimes.
fn parse_time_range(cell: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let (start, end) = cell
        .split_once('~')
        .ok_or_else(|| anyhow::anyhow!("time cell {:?} has no '~' separator", cell))?;
    let start = NaiveDateTime::parse_from_str(start.trim(), TICKET_TIME_FORMAT)?;
    let end = NaiveDateTime::parse_from_str(end.trim(), TICKET_TIME_FORMAT)?;
    Ok((start, end))
}

/// Whether a result banner message reads as a rejection.
fn is_failure_banner(message: &str) -> bool {
    let lowered = message.to_lowercase();
    FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

pub struct Bot {
    driver: Box<dyn PageDriver>,
    model: CaptchaModel,
    fetcher: Box<dyn CaptchaFetcher>,
    config: BotConfig,
}

impl Bot {
    pub fn new(
        driver: Box<dyn PageDriver>,
        model: CaptchaModel,
        fetcher: Box<dyn CaptchaFetcher>,
        config: BotConfig,
    ) -> Self {
        Self {
            driver,
            model,
            fetcher,
            config,
        }
    }

    /// Logs in, retrying per the configured policy.
    pub fn login(&mut self) -> Result<bool> {
        let attempts = self.config.retry_times;
        let delay = Duration::from_secs(self.config.delay_sec);
        retry::run_with_retry("login", attempts, delay, || self.login_once())
    }

    /// Books the configured ticket, retrying per the configured policy.
    pub fn book(&mut self) -> Result<bool> {
        let attempts = self.config.retry_times;
        let delay = Duration::from_secs(self.config.delay_sec);
        retry::run_with_retry("book", attempts, delay, || self.book_once())
    }

    /// Releases the browser session. Safe to call more than once.
    pub fn close(&mut self) {
        self.driver.close();
    }

    /// One login attempt. Recoverable failures abort the attempt and leave
    /// the retry loop to re-navigate from scratch.
    fn login_once(&mut self) -> Result<bool, AttemptError> {
        let web_url = require_field("web_url", &self.config.web_url)?;
        let account = require_field("account", &self.config.account)?;
        let password = require_field("password", &self.config.password)?;

        // A half-loaded login page is useless, so a slow load fails the
        // attempt instead of being ignored.
        self.driver.navigate(&web_url)?;
        self.driver.wait_stable(PAGE_LOAD_TIMEOUT)?;

        let captcha_image = self.driver.find_element(CAPTCHA_IMAGE)?;
        let src = self
            .driver
            .attribute(&captcha_image, "src")?
            .ok_or_else(|| AttemptError::Precondition("captcha image has no src".to_string()))?;
        // The src carries a ";jsessionid=..." suffix; the bare URL is enough
        // once the cookie is forwarded.
        let image_url = src.split(';').next().unwrap_or(&src).to_string();

        let token = self.driver.get_cookie(SESSION_COOKIE)?.ok_or_else(|| {
            AttemptError::Precondition(format!("missing {} cookie", SESSION_COOKIE))
        })?;

        let image = self
            .fetcher
            .fetch(&image_url, &format!("{}={}", SESSION_COOKIE, token))
            .map_err(AttemptError::Fatal)?;
        let captcha_text = self.model.solve(&image)?;
        log::info!("Captcha decoded as {:?}", captcha_text);

        let fields = self.driver.find_elements(LOGIN_INPUTS)?;
        if fields.len() < 3 {
            return Err(AttemptError::Precondition(format!(
                "expected 3 login fields, found {}",
                fields.len()
            )));
        }
        let values = [account.as_str(), password.as_str(), captcha_text.as_str()];
        for (field, value) in fields.iter().zip(values) {
            self.driver.clear(field)?;
            self.driver.send_keys(field, value)?;
        }

        let submit = self.driver.find_element(LOGIN_BUTTON)?;
        self.driver.click(&submit)?;
        // The page may already have transitioned by the time we wait, so a
        // timeout here is not a failure.
        match self.driver.wait_stable(SUBMIT_TIMEOUT) {
            Ok(()) | Err(DriverError::Timeout { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        match self.probe_banner()? {
            None => Ok(true),
            Some((message, confirm)) => {
                self.driver.click(&confirm)?;
                log::error!("Login failed, reason: {}", message);
                Ok(false)
            }
        }
    }

    /// One booking attempt.
    fn book_once(&mut self) -> Result<bool, AttemptError> {
        let ticket_name = require_field("ticket_name", &self.config.ticket_name)?;
        let item_name = require_field("ticket_item_name", &self.config.ticket_item_name)?;

        self.driver.refresh()?;
        self.driver.wait_stable(REFRESH_TIMEOUT)?;

        let tickets = self.parse_tickets()?;
        log::info!("Listing has {} tickets", tickets.len());
        for ticket in &tickets {
            log::debug!(
                "Ticket {}: {} by {} ({} ~ {})",
                ticket.id,
                ticket.name,
                ticket.initiator,
                ticket.start_time,
                ticket.end_time
            );
        }

        let Some(target) = tickets.iter().find(|t| t.name.contains(&ticket_name)) else {
            log::error!("No ticket matching {:?} in the listing", ticket_name);
            return Ok(false);
        };
        log::info!("Planning to reserve ticket {} ({})", target.id, target.name);
        let reserve_button = target.reserve_button.clone();
        self.driver.click(&reserve_button)?;

        let popup = self.driver.wait_visible(POPUP, ELEMENT_TIMEOUT)?;

        if let Some((message, confirm)) = self.probe_banner()? {
            self.driver.click(&confirm)?;
            log::error!("Booking failed, reason: {}", message);
            return Ok(false);
        }

        let combo = self
            .driver
            .find_from(&popup, COMBO_INPUT)?
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::ElementNotFound(COMBO_INPUT.to_string()))?;
        self.driver.click(&combo)?;
        self.driver.wait_visible(COMBO_DROPDOWN, ELEMENT_TIMEOUT)?;

        let items = self.driver.find_elements(COMBO_ITEMS)?;
        let mut chosen = false;
        for item in &items {
            let label = self.driver.text(item)?;
            if label.contains(&item_name) {
                self.driver.click(item)?;
                chosen = true;
                break;
            }
        }
        if !chosen {
            return Err(AttemptError::Precondition(format!(
                "cannot find target item ({})",
                item_name
            )));
        }

        let submit = self
            .driver
            .find_from(&popup, POPUP_SUBMIT)?
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::ElementNotFound(POPUP_SUBMIT.to_string()))?;
        self.driver.click(&submit)?;

        match self.probe_banner()? {
            Some((message, confirm)) => {
                self.driver.click(&confirm)?;
                if is_failure_banner(&message) {
                    log::error!("Booking rejected: {}", message);
                    Ok(false)
                } else {
                    log::info!("Booking result: {}", message);
                    Ok(true)
                }
            }
            None => {
                log::error!("Booking produced no result message");
                Ok(false)
            }
        }
    }

    /// Snapshots the visible listing rows into tickets.
    ///
    /// Rows with too few cells (headers, fillers) are skipped; a time cell
    /// that does not parse is fatal, since it means the page layout changed.
    fn parse_tickets(&mut self) -> Result<Vec<Ticket>, AttemptError> {
        let table = self.driver.wait_visible(LISTING_TABLE, ELEMENT_TIMEOUT)?;
        let rows = self.driver.find_from(&table, LISTING_ROWS)?;

        let mut tickets = Vec::new();
        for row in &rows {
            if self.driver.text(row)?.trim().is_empty() {
                continue;
            }
            let cells = self.driver.find_from(row, ROW_CELLS)?;
            if cells.len() < 5 {
                continue;
            }

            let time_cell = self.driver.text(&cells[3])?;
            let (start_time, end_time) =
                parse_time_range(&time_cell).map_err(AttemptError::Fatal)?;
            let reserve_button = self
                .driver
                .find_from(&cells[4], RESERVE_BUTTON)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AttemptError::ElementNotFound("reservation button".to_string())
                })?;

            tickets.push(Ticket {
                id: self.driver.text(&cells[0])?,
                name: self.driver.text(&cells[1])?,
                initiator: self.driver.text(&cells[2])?,
                start_time,
                end_time,
                reserve_button,
            });
        }
        Ok(tickets)
    }

    /// Looks for an info/error banner, returning its message and
    /// acknowledgement button when present.
    fn probe_banner(&mut self) -> Result<Option<(String, ElementHandle)>, AttemptError> {
        let Some(label) = self.driver.find_elements(BANNER_LABEL)?.into_iter().next() else {
            return Ok(None);
        };
        let message = self.driver.text(&label)?;
        let confirm = self.driver.find_element(BANNER_CONFIRM)?;
        Ok(Some((message, confirm)))
    }
}

impl crate::schedule::BookingTasks for Bot {
    fn pre_login(&mut self) -> Result<bool> {
        self.login()
    }

    fn book_now(&mut self) -> Result<bool> {
        self.book()
    }

    fn release(&mut self) {
        self.close();
    }
}

fn require_field(name: &str, value: &str) -> Result<String, AttemptError> {
    if value.is_empty() {
        Err(AttemptError::Precondition(format!("{} is not configured", name)))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::captcha::test_support::ScriptedDetector;
    use crate::captcha::{BBox, Detection};
    use crate::driver::fake::{ClickEffect, FakeDriver, FakeElement};

    struct FakeFetcher;

    impl CaptchaFetcher for FakeFetcher {
        fn fetch(&self, _url: &str, _cookie: &str) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(4, 4))
        }
    }

    fn element(text: &str) -> FakeElement {
        FakeElement {
            text: text.to_string(),
            attributes: HashMap::new(),
        }
    }

    fn test_config() -> BotConfig {
        toml::from_str(
            r#"
web_url = "https://booking.example.com"
account = "user"
password = "secret"
ticket_name = "Gym"
ticket_item_name = "Court A"
start_time = "09:05"
pre_login_time = "09:00"
retry_times = 1
"#,
        )
        .unwrap()
    }

    /// Detector scripted to decode every image as "AB".
    fn ab_detector() -> ScriptedDetector {
        ScriptedDetector {
            per_image: vec![vec![
                Detection {
                    class_id: 0,
                    bbox: BBox::new(0.0, 0.0, 9.0, 10.0),
                    confidence: 0.9,
                },
                Detection {
                    class_id: 1,
                    bbox: BBox::new(10.0, 0.0, 19.0, 10.0),
                    confidence: 0.8,
                },
            ]],
        }
    }

    fn bot_with(driver: FakeDriver, detector: ScriptedDetector) -> Bot {
        Bot::new(
            Box::new(driver),
            CaptchaModel::with_detector(Box::new(detector)),
            Box::new(FakeFetcher),
            test_config(),
        )
    }

    /// Arranges the login page on the fake driver.
    fn arrange_login_page(driver: &FakeDriver) {
        let mut state = driver.state.borrow_mut();
        let mut captcha = element("");
        captcha.attributes.insert(
            "src".to_string(),
            "https://booking.example.com/captcha.jpg;jsessionid=XYZ".to_string(),
        );
        state.add_element("captcha", captcha);
        state.bind(CAPTCHA_IMAGE, &["captcha"]);
        state.set_cookie(SESSION_COOKIE, "token-1");
        for id in ["f-account", "f-password", "f-captcha"] {
            state.add_element(id, element(""));
        }
        state.bind(LOGIN_INPUTS, &["f-account", "f-password", "f-captcha"]);
        state.add_element("login-btn", element("Login"));
        state.bind(LOGIN_BUTTON, &["login-btn"]);
    }

    #[test]
    fn test_login_fills_fields_in_order_and_succeeds() {
        let driver = FakeDriver::new();
        arrange_login_page(&driver);
        let state = driver.state.clone();

        let mut bot = bot_with(driver, ab_detector());
        assert!(bot.login().unwrap());

        let actions = state.borrow().actions.clone();
        let expected = [
            "navigate https://booking.example.com",
            "clear f-account",
            "keys f-account user",
            "clear f-password",
            "keys f-password secret",
            "clear f-captcha",
            "keys f-captcha AB",
            "click login-btn",
        ];
        // All expected interactions happened, in order.
        let mut last = 0;
        for needle in expected {
            let pos = actions[last..]
                .iter()
                .position(|a| a == needle)
                .unwrap_or_else(|| panic!("missing action {:?} in {:?}", needle, actions));
            last += pos + 1;
        }
    }

    #[test]
    fn test_login_banner_means_domain_failure() {
        let driver = FakeDriver::new();
        arrange_login_page(&driver);
        {
            let mut state = driver.state.borrow_mut();
            state.add_element("banner-label", element("驗證碼錯誤"));
            state.add_element("banner-ok", element("OK"));
            state.on_click(
                "login-btn",
                ClickEffect::Bind(BANNER_LABEL.to_string(), vec!["banner-label".to_string()]),
            );
            state.on_click(
                "login-btn",
                ClickEffect::Bind(BANNER_CONFIRM.to_string(), vec!["banner-ok".to_string()]),
            );
            state.on_click("banner-ok", ClickEffect::Unbind(BANNER_LABEL.to_string()));
        }
        let state = driver.state.clone();

        let mut bot = bot_with(driver, ab_detector());
        assert!(!bot.login().unwrap());
        // The banner was acknowledged.
        assert!(state.borrow().actions.iter().any(|a| a == "click banner-ok"));
    }

    #[test]
    fn test_login_missing_captcha_is_recoverable() {
        let driver = FakeDriver::new();
        // Page without a captcha element at all.
        let mut bot = bot_with(driver, ab_detector());
        let result = bot.login_once();
        match result {
            Err(e) => assert!(e.is_recoverable()),
            Ok(_) => panic!("expected an attempt failure"),
        }
    }

    /// Arranges the listing page plus reservation pop-up on the fake driver.
    fn arrange_listing_page(driver: &FakeDriver, result_banner: Option<&str>) {
        let mut state = driver.state.borrow_mut();

        state.add_element("table", element("listing"));
        state.bind(LISTING_TABLE, &["table"]);
        state.bind_scoped("table", LISTING_ROWS, &["row-1", "row-2"]);

        state.add_element("row-1", element("1 Pool ..."));
        state.bind_scoped("row-1", ROW_CELLS, &["r1c1", "r1c2", "r1c3", "r1c4", "r1c5"]);
        state.add_element("r1c1", element("1"));
        state.add_element("r1c2", element("Pool session"));
        state.add_element("r1c3", element("staff"));
        state.add_element("r1c4", element("2026/08/24 09:00 ~ 2026/08/24 10:00"));
        state.add_element("r1c5", element(""));
        state.add_element("r1-btn", element("reserve"));
        state.bind_scoped("r1c5", RESERVE_BUTTON, &["r1-btn"]);

        state.add_element("row-2", element("2 Gym ..."));
        state.bind_scoped("row-2", ROW_CELLS, &["r2c1", "r2c2", "r2c3", "r2c4", "r2c5"]);
        state.add_element("r2c1", element("2"));
        state.add_element("r2c2", element("Gym evening"));
        state.add_element("r2c3", element("staff"));
        state.add_element("r2c4", element("2026/08/24 18:00 ~ 2026/08/24 20:00"));
        state.add_element("r2c5", element(""));
        state.add_element("r2-btn", element("reserve"));
        state.bind_scoped("r2c5", RESERVE_BUTTON, &["r2-btn"]);

        // Clicking the row-2 button opens the pop-up.
        state.add_element("popup", element(""));
        state.on_click(
            "r2-btn",
            ClickEffect::Bind(POPUP.to_string(), vec!["popup".to_string()]),
        );

        state.add_element("combo", element(""));
        state.bind_scoped("popup", COMBO_INPUT, &["combo"]);
        state.add_element("dropdown", element(""));
        state.on_click(
            "combo",
            ClickEffect::Bind(COMBO_DROPDOWN.to_string(), vec!["dropdown".to_string()]),
        );

        state.add_element("item-1", element("Court B"));
        state.add_element("item-2", element("Court A (evening)"));
        state.bind(COMBO_ITEMS, &["item-1", "item-2"]);

        state.add_element("submit", element("confirm"));
        state.bind_scoped("popup", POPUP_SUBMIT, &["submit"]);

        if let Some(message) = result_banner {
            state.add_element("result-label", element(message));
            state.add_element("result-ok", element("OK"));
            state.on_click(
                "submit",
                ClickEffect::Bind(BANNER_LABEL.to_string(), vec!["result-label".to_string()]),
            );
            state.on_click(
                "submit",
                ClickEffect::Bind(BANNER_CONFIRM.to_string(), vec!["result-ok".to_string()]),
            );
            state.on_click("result-ok", ClickEffect::Unbind(BANNER_LABEL.to_string()));
        }
    }

    #[test]
    fn test_book_reserves_matching_ticket() {
        let driver = FakeDriver::new();
        arrange_listing_page(&driver, Some("预约成功"));
        let state = driver.state.clone();

        let mut bot = bot_with(driver, ab_detector());
        assert!(bot.book().unwrap());

        let actions = state.borrow().actions.clone();
        // The Gym row's button was used, not the Pool row's.
        assert!(actions.iter().any(|a| a == "click r2-btn"));
        assert!(!actions.iter().any(|a| a == "click r1-btn"));
        // First matching dropdown item selected.
        assert!(actions.iter().any(|a| a == "click item-2"));
        assert!(!actions.iter().any(|a| a == "click item-1"));
        assert!(actions.iter().any(|a| a == "click submit"));
    }

    #[test]
    fn test_book_failure_banner_is_rejected() {
        let driver = FakeDriver::new();
        arrange_listing_page(&driver, Some("预约失败：名额已满"));

        let mut bot = bot_with(driver, ab_detector());
        assert!(!bot.book().unwrap());
    }

    #[test]
    fn test_book_no_result_banner_is_failure() {
        let driver = FakeDriver::new();
        arrange_listing_page(&driver, None);

        let mut bot = bot_with(driver, ab_detector());
        assert!(!bot.book().unwrap());
    }

    #[test]
    fn test_book_ticket_not_found_takes_no_action() {
        let driver = FakeDriver::new();
        arrange_listing_page(&driver, Some("预约成功"));
        let state = driver.state.clone();

        let mut bot = bot_with(driver, ab_detector());
        bot.config.ticket_name = "Sauna".to_string();
        assert!(!bot.book().unwrap());
        assert!(!state.borrow().actions.iter().any(|a| a.starts_with("click")));
    }

    #[test]
    fn test_book_missing_item_is_precondition_failure() {
        let driver = FakeDriver::new();
        arrange_listing_page(&driver, Some("预约成功"));

        let mut bot = bot_with(driver, ab_detector());
        bot.config.ticket_item_name = "Court Z".to_string();
        match bot.book_once() {
            Err(AttemptError::Precondition(_)) => {}
            other => panic!("expected precondition failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_parse_time_range() {
        let (start, end) = parse_time_range("2026/08/24 09:00 ~ 2026/08/24 10:30").unwrap();
        assert_eq!(
            start,
            NaiveDateTime::parse_from_str("2026/08/24 09:00", TICKET_TIME_FORMAT).unwrap()
        );
        assert_eq!(
            end,
            NaiveDateTime::parse_from_str("2026/08/24 10:30", TICKET_TIME_FORMAT).unwrap()
        );
    }

    #[test]
    fn test_parse_time_range_rejects_malformed_cell() {
        assert!(parse_time_range("2026/08/24 09:00").is_err());
        assert!(parse_time_range("now ~ later").is_err());
    }

    #[test]
    fn test_failure_banner_classification() {
        assert!(is_failure_banner("预约失败"));
        assert!(is_failure_banner("系統錯誤"));
        assert!(is_failure_banner("Booking FAILED"));
        assert!(!is_failure_banner("预约成功"));
        assert!(!is_failure_banner("OK"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let driver = FakeDriver::new();
        let state = driver.state.clone();
        let mut bot = bot_with(driver, ab_detector());
        bot.close();
        bot.close();
        assert!(state.borrow().closed);
        assert_eq!(state.borrow().close_count, 2);
    }
}
