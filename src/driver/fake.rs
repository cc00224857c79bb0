//! Scripted page driver for routine tests.
//!
//! Pages are flat selector -> element bindings plus optional click effects
//! that add or remove bindings, enough to script banner pop-ups and page
//! transitions without a browser.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use super::{DriverError, DriverResult, ElementHandle, PageDriver};

#[derive(Debug, Default, Clone)]
pub struct FakeElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
}

/// What a click on a given element does to the page.
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Bind `selector` to the listed element ids.
    Bind(String, Vec<String>),
    /// Remove a selector binding (e.g. dismissing a banner).
    Unbind(String),
}

#[derive(Debug, Default)]
pub struct FakeState {
    elements: HashMap<String, FakeElement>,
    selectors: HashMap<String, Vec<String>>,
    scoped: HashMap<(String, String), Vec<String>>,
    cookies: HashMap<String, String>,
    on_click: HashMap<String, Vec<ClickEffect>>,
    /// Every interaction in order, for assertions.
    pub actions: Vec<String>,
    pub closed: bool,
    pub close_count: u32,
}

impl FakeState {
    pub fn add_element(&mut self, id: &str, element: FakeElement) {
        self.elements.insert(id.to_string(), element);
    }

    pub fn bind(&mut self, selector: &str, ids: &[&str]) {
        self.selectors.insert(
            selector.to_string(),
            ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn bind_scoped(&mut self, parent: &str, selector: &str, ids: &[&str]) {
        self.scoped.insert(
            (parent.to_string(), selector.to_string()),
            ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn on_click(&mut self, id: &str, effect: ClickEffect) {
        self.on_click.entry(id.to_string()).or_default().push(effect);
    }
}

/// `PageDriver` over shared scripted state.
///
/// Tests keep a second `Rc` to the state to arrange the page and inspect
/// recorded actions afterwards.
#[derive(Clone)]
pub struct FakeDriver {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeState::default())),
        }
    }

    fn lookup(&self, selector: &str) -> Vec<ElementHandle> {
        self.state
            .borrow()
            .selectors
            .get(selector)
            .map(|ids| ids.iter().map(|id| ElementHandle(id.clone())).collect())
            .unwrap_or_default()
    }
}

impl PageDriver for FakeDriver {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.state.borrow_mut().actions.push(format!("navigate {}", url));
        Ok(())
    }

    fn refresh(&mut self) -> DriverResult<()> {
        self.state.borrow_mut().actions.push("refresh".to_string());
        Ok(())
    }

    fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        self.lookup(selector)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoSuchElement {
                selector: selector.to_string(),
            })
    }

    fn find_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        Ok(self.lookup(selector))
    }

    fn find_from(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        Ok(self
            .state
            .borrow()
            .scoped
            .get(&(parent.0.clone(), selector.to_string()))
            .map(|ids| ids.iter().map(|id| ElementHandle(id.clone())).collect())
            .unwrap_or_default())
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let mut state = self.state.borrow_mut();
        state.actions.push(format!("click {}", element.0));
        let effects = state.on_click.remove(&element.0).unwrap_or_default();
        for effect in effects {
            match effect {
                ClickEffect::Bind(selector, ids) => {
                    state.selectors.insert(selector, ids);
                }
                ClickEffect::Unbind(selector) => {
                    state.selectors.remove(&selector);
                }
            }
        }
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.state
            .borrow_mut()
            .actions
            .push(format!("clear {}", element.0));
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.state
            .borrow_mut()
            .actions
            .push(format!("keys {} {}", element.0, text));
        Ok(())
    }

    fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        Ok(self
            .state
            .borrow()
            .elements
            .get(&element.0)
            .map(|e| e.text.clone())
            .unwrap_or_default())
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        Ok(self
            .state
            .borrow()
            .elements
            .get(&element.0)
            .and_then(|e| e.attributes.get(name).cloned()))
    }

    fn get_cookie(&mut self, name: &str) -> DriverResult<Option<String>> {
        Ok(self.state.borrow().cookies.get(name).cloned())
    }

    fn wait_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle> {
        // Scripted pages are already "loaded"; missing means timeout.
        self.find_element(selector).map_err(|_| DriverError::Timeout {
            what: selector.to_string(),
            timeout,
        })
    }

    fn wait_stable(&mut self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        state.close_count += 1;
    }
}
