//! Scripted UI driver
//!
//! Replays a screen script instead of talking to a phone. A script is a set
//! of named screens; each screen lists the elements it shows and the
//! transitions that leave it (on click, after a delay, after N refresh
//! swipes, or on text submit). Time is read from `tokio::time`, so tests
//! running with a paused clock step through multi-minute flows instantly.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::common::{Error, Result};
use crate::driver::{Direction, DriverConnector, DriverError, DriverResult, Locator, UiDriver};

/// A complete screen script
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenScript {
    /// Screen shown when the driver connects and after an app restart
    pub start: String,
    pub screens: Vec<Screen>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Screen {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds after the screen is entered before the element shows
    #[serde(default)]
    pub after_secs: f64,
    /// Seconds after the screen is entered when the element goes away
    #[serde(default)]
    pub until_secs: Option<f64>,
    /// Clicking the element hides it
    #[serde(default)]
    pub dismissable: bool,
}

impl Element {
    fn matched_by(&self, locator: &Locator) -> bool {
        locator.matches(
            self.resource_id.as_deref(),
            self.text.as_deref(),
            self.description.as_deref(),
        )
    }
}

/// Leaves a screen; exactly one trigger field must be set
#[derive(Debug, Clone, Deserialize)]
pub struct Transition {
    pub to: String,
    /// Clicking an element matched by this locator
    #[serde(default)]
    pub click: Option<Locator>,
    /// Time since the screen was entered
    #[serde(default)]
    pub after_secs: Option<f64>,
    /// Number of pull-to-refresh swipes on this screen
    #[serde(default)]
    pub swipes: Option<u32>,
    /// Submitting typed text
    #[serde(default)]
    pub submit: bool,
    /// Latency between a click/swipe/submit trigger and the new screen
    #[serde(default)]
    pub delay_secs: f64,
}

impl Transition {
    fn trigger_count(&self) -> usize {
        [
            self.click.is_some(),
            self.after_secs.is_some(),
            self.swipes.is_some(),
            self.submit,
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

impl ScreenScript {
    /// Parse and validate a YAML screen script
    pub fn from_yaml(content: &str) -> Result<Self> {
        let script: ScreenScript =
            serde_yaml::from_str(content).map_err(|e| Error::ScriptParse(e.to_string()))?;
        script.validate()?;
        Ok(script)
    }

    /// Load a YAML screen script from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, &e))?;
        Self::from_yaml(&content)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.screens.iter().position(|s| s.name == name)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::ScriptParse(msg));

        if self.index_of(&self.start).is_none() {
            return invalid(format!("start screen '{}' is not defined", self.start));
        }
        let mut names = HashSet::new();
        for screen in &self.screens {
            if !names.insert(screen.name.as_str()) {
                return invalid(format!("screen '{}' is defined twice", screen.name));
            }
            for t in &screen.transitions {
                if self.index_of(&t.to).is_none() {
                    return invalid(format!(
                        "screen '{}' transitions to unknown screen '{}'",
                        screen.name, t.to
                    ));
                }
                if t.trigger_count() != 1 {
                    return invalid(format!(
                        "transition '{}' -> '{}' needs exactly one trigger",
                        screen.name, t.to
                    ));
                }
                if t.after_secs.is_some_and(|s| s <= 0.0) {
                    return invalid(format!(
                        "timed transition '{}' -> '{}' needs a positive delay",
                        screen.name, t.to
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Interaction recorded by a [`ScriptedDriver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Click(Locator),
    GetText(Locator),
    ScrollTo(String),
    Swipe(Direction),
    ClearText,
    SendText(String),
    SubmitText,
    RestartApp(String),
}

/// Shared record of every interaction across driver sessions
#[derive(Debug, Clone, Default)]
pub struct CallJournal(Arc<Mutex<Vec<DriverCall>>>);

impl CallJournal {
    fn record(&self, call: DriverCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }

    /// Snapshot of recorded calls
    pub fn calls(&self) -> Vec<DriverCall> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }
}

/// UI driver replaying a [`ScreenScript`]
pub struct ScriptedDriver {
    script: Arc<ScreenScript>,
    current: usize,
    entered: Instant,
    pending: Option<(usize, Instant)>,
    swipes: u32,
    dismissed: HashSet<usize>,
    journal: CallJournal,
    poll_interval: Duration,
}

impl ScriptedDriver {
    pub fn new(script: ScreenScript) -> Self {
        Self::with_journal(Arc::new(script), CallJournal::default())
    }

    pub fn with_journal(script: Arc<ScreenScript>, journal: CallJournal) -> Self {
        let current = script.index_of(&script.start).unwrap_or(0);
        Self {
            script,
            current,
            entered: Instant::now(),
            pending: None,
            swipes: 0,
            dismissed: HashSet::new(),
            journal,
            poll_interval: crate::driver::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }

    /// Name of the screen currently shown
    pub fn screen_name(&mut self) -> String {
        self.advance();
        self.screen().name.clone()
    }

    fn screen(&self) -> &Screen {
        &self.script.screens[self.current]
    }

    fn enter(&mut self, index: usize, at: Instant) {
        tracing::trace!(screen = %self.script.screens[index].name, "Scripted screen entered");
        self.current = index;
        self.entered = at;
        self.pending = None;
        self.swipes = 0;
        self.dismissed.clear();
    }

    fn go_to(&mut self, name: &str, delay_secs: f64) {
        let Some(index) = self.script.index_of(name) else {
            return;
        };
        let at = Instant::now() + Duration::from_secs_f64(delay_secs.max(0.0));
        if delay_secs <= 0.0 {
            self.enter(index, at);
        } else {
            self.pending = Some((index, at));
        }
    }

    /// Apply every transition due by now, in time order
    fn advance(&mut self) {
        let now = Instant::now();
        loop {
            let timed = self
                .screen()
                .transitions
                .iter()
                .filter_map(|t| {
                    let secs = t.after_secs?;
                    let index = self.script.index_of(&t.to)?;
                    Some((index, self.entered + Duration::from_secs_f64(secs)))
                })
                .min_by_key(|(_, at)| *at);

            let next = match (self.pending, timed) {
                (Some(p), Some(t)) => Some(if p.1 <= t.1 { p } else { t }),
                (p, t) => p.or(t),
            };

            match next {
                Some((index, at)) if at <= now => self.enter(index, at),
                _ => break,
            }
        }
    }

    fn visible(&self) -> impl Iterator<Item = (usize, &Element)> {
        let since = Instant::now().saturating_duration_since(self.entered);
        self.screen()
            .elements
            .iter()
            .enumerate()
            .filter(move |(i, e)| {
                !self.dismissed.contains(i)
                    && since >= Duration::from_secs_f64(e.after_secs)
                    && e.until_secs
                        .map_or(true, |u| since < Duration::from_secs_f64(u))
            })
    }

    fn find(&self, locator: &Locator) -> Option<(usize, Element)> {
        self.visible()
            .find(|(_, e)| e.matched_by(locator))
            .map(|(i, e)| (i, e.clone()))
    }

    fn fire<F>(&mut self, matches: F)
    where
        F: Fn(&Transition) -> bool,
    {
        let next = self
            .screen()
            .transitions
            .iter()
            .find(|t| matches(t))
            .map(|t| (t.to.clone(), t.delay_secs));
        if let Some((to, delay)) = next {
            self.go_to(&to, delay);
        }
    }
}

#[async_trait]
impl UiDriver for ScriptedDriver {
    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        self.advance();
        self.journal.record(DriverCall::Click(locator.clone()));

        let (index, element) = self
            .find(locator)
            .ok_or_else(|| DriverError::element_not_found(locator))?;
        if element.dismissable {
            self.dismissed.insert(index);
        }
        self.fire(|t| t.click.as_ref().is_some_and(|c| element.matched_by(c)));
        Ok(())
    }

    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool> {
        self.advance();
        Ok(self.find(locator).is_some())
    }

    async fn get_text(&mut self, locator: &Locator) -> DriverResult<String> {
        self.advance();
        self.journal.record(DriverCall::GetText(locator.clone()));
        self.find(locator)
            .map(|(_, e)| e.text.unwrap_or_default())
            .ok_or_else(|| DriverError::element_not_found(locator))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn scroll_to(&mut self, text: &str) -> DriverResult<()> {
        self.advance();
        self.journal.record(DriverCall::ScrollTo(text.to_string()));
        if self.find(&Locator::text(text)).is_some() {
            Ok(())
        } else {
            Err(DriverError::ElementNotFound(format!("text={text:?}")))
        }
    }

    async fn swipe(&mut self, direction: Direction) -> DriverResult<()> {
        self.advance();
        self.journal.record(DriverCall::Swipe(direction));
        if direction == Direction::Down {
            self.swipes += 1;
            let swipes = self.swipes;
            self.fire(|t| t.swipes.is_some_and(|n| swipes >= n));
        }
        Ok(())
    }

    async fn clear_text(&mut self) -> DriverResult<()> {
        self.journal.record(DriverCall::ClearText);
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> DriverResult<()> {
        self.journal.record(DriverCall::SendText(text.to_string()));
        Ok(())
    }

    async fn submit_text(&mut self) -> DriverResult<()> {
        self.advance();
        self.journal.record(DriverCall::SubmitText);
        self.fire(|t| t.submit);
        Ok(())
    }

    async fn restart_app(&mut self, package: &str) -> DriverResult<()> {
        self.journal.record(DriverCall::RestartApp(package.to_string()));
        let start = self.script.start.clone();
        self.go_to(&start, 0.0);
        Ok(())
    }
}

/// Hands out a fresh [`ScriptedDriver`] per connection, sharing one journal
#[derive(Clone)]
pub struct ScriptedConnector {
    script: Arc<ScreenScript>,
    journal: CallJournal,
    connects: Arc<Mutex<u32>>,
}

impl ScriptedConnector {
    pub fn new(script: ScreenScript) -> Self {
        Self {
            script: Arc::new(script),
            journal: CallJournal::default(),
            connects: Arc::new(Mutex::new(0)),
        }
    }

    pub fn journal(&self) -> CallJournal {
        self.journal.clone()
    }

    /// Number of sessions opened so far
    pub fn connects(&self) -> u32 {
        self.connects.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl DriverConnector for ScriptedConnector {
    async fn connect(&mut self) -> DriverResult<Box<dyn UiDriver>> {
        if let Ok(mut count) = self.connects.lock() {
            *count += 1;
        }
        tracing::info!(start = %self.script.start, "Connected to scripted phone");
        Ok(Box::new(ScriptedDriver::with_journal(
            self.script.clone(),
            self.journal.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SCREENS: &str = r#"
start: looking
screens:
  - name: looking
    elements:
      - { resource_id: "mosaic.base_text", text: "Looking for your device" }
      - { resource_id: "promo", dismissable: true, after_secs: 5 }
    transitions:
      - after_secs: 149.9
        to: found
  - name: found
    elements:
      - resource_id: "NewDeviceFoundPage"
"#;

    fn looking() -> Locator {
        Locator::id("mosaic.base_text").with_text("Looking for your device")
    }

    #[test]
    fn test_rejects_unknown_target() {
        let yaml = r#"
start: a
screens:
  - name: a
    transitions:
      - { after_secs: 1, to: b }
"#;
        assert!(matches!(
            ScreenScript::from_yaml(yaml),
            Err(Error::ScriptParse(_))
        ));
    }

    #[test]
    fn test_rejects_transition_without_trigger() {
        let yaml = r#"
start: a
screens:
  - name: a
    transitions:
      - { to: a }
"#;
        assert!(ScreenScript::from_yaml(yaml).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_true_just_before_deadline_is_observed() {
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(TWO_SCREENS).unwrap());
        let start = Instant::now();

        let gone = driver
            .wait_for_disappear(&looking(), Duration::from_secs(150))
            .await
            .unwrap();

        assert!(gone);
        assert!(start.elapsed() <= Duration::from_secs(150));
        assert_eq!(driver.screen_name(), "found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_never_reported_early() {
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(TWO_SCREENS).unwrap());
        let start = Instant::now();

        let gone = driver
            .wait_for_disappear(&looking(), Duration::from_secs(100))
            .await
            .unwrap();

        assert!(!gone);
        assert!(start.elapsed() >= Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_element_and_dismiss() {
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(TWO_SCREENS).unwrap());
        let promo = Locator::id("promo");

        assert!(!driver.exists(&promo).await.unwrap());
        assert!(driver
            .wait_for_appear(&promo, Duration::from_secs(10))
            .await
            .unwrap());

        driver.click(&promo).await.unwrap();
        assert!(!driver.exists(&promo).await.unwrap());
        assert_eq!(driver.journal().calls(), vec![DriverCall::Click(promo)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_missing_element_is_error() {
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(TWO_SCREENS).unwrap());
        let err = driver.click(&Locator::id("nope")).await.unwrap_err();
        assert!(matches!(err, DriverError::ElementNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swipe_and_submit_transitions() {
        let yaml = r#"
start: list
screens:
  - name: list
    transitions:
      - { swipes: 2, to: refreshed }
  - name: refreshed
    transitions:
      - { submit: true, to: list, delay_secs: 1 }
"#;
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(yaml).unwrap());
        driver.swipe(Direction::Down).await.unwrap();
        assert_eq!(driver.screen_name(), "list");
        driver.swipe(Direction::Down).await.unwrap();
        assert_eq!(driver.screen_name(), "refreshed");

        driver.submit_text().await.unwrap();
        assert_eq!(driver.screen_name(), "refreshed");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(driver.screen_name(), "list");
    }
}
