//! Declarative flow definitions
//!
//! Each onboarding variant is a table of [`Stage`]s built from the run
//! parameters. Adding a variant means adding a table here; the executor
//! and flow runner stay unchanged.

use std::time::Duration;

use super::{FlowState, FlowVariant};
use crate::common::{Config, Settle};
use crate::driver::{Direction, Locator};

/// Parameters that vary between runs of the same variant
#[derive(Debug, Clone, Default)]
pub struct FlowParams {
    /// Saved network selected during unguided setup
    pub wifi_ssid: Option<String>,
    /// Name the device appears under in the companion app
    pub device_name: String,
    /// 11-digit numeric setup code for commissioning
    pub pairing_code: Option<String>,
    /// Package of the companion app
    pub app_package: String,
}

/// What a step does before its expectation is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Click an element; a locator with text is a click-with-text
    Click(Locator),
    /// Nothing to do; the step only waits for its expectation
    Wait,
    Gesture(Gesture),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    RestartApp(String),
    ScrollTo(String),
    Swipe(Direction),
    /// Clear the focused field, type, then submit
    EnterText(String),
}

/// Post-condition a step waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    Appear(Locator),
    Disappear(Locator),
}

impl Expect {
    pub fn locator(&self) -> &Locator {
        match self {
            Expect::Appear(l) | Expect::Disappear(l) => l,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Expect::Appear(_) => "appear",
            Expect::Disappear(_) => "disappear",
        }
    }
}

/// One UI action plus its expected post-condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// State reached when the step succeeds
    pub state: FlowState,
    pub action: Action,
    pub expect: Option<Expect>,
    pub timeout: Duration,
    /// Settle delay applied before the action
    pub settle: Option<Settle>,
}

impl Step {
    fn new(state: FlowState, action: Action) -> Self {
        Self {
            state,
            action,
            expect: None,
            timeout: Duration::ZERO,
            settle: None,
        }
    }

    fn click(state: FlowState, target: Locator) -> Self {
        Self::new(state, Action::Click(target))
    }

    fn wait(state: FlowState) -> Self {
        Self::new(state, Action::Wait)
    }

    fn gesture(state: FlowState, gesture: Gesture) -> Self {
        Self::new(state, Action::Gesture(gesture))
    }

    fn appear(mut self, locator: Locator, timeout: Duration) -> Self {
        self.expect = Some(Expect::Appear(locator));
        self.timeout = timeout;
        self
    }

    fn disappear(mut self, locator: Locator, timeout: Duration) -> Self {
        self.expect = Some(Expect::Disappear(locator));
        self.timeout = timeout;
        self
    }

    fn settle(mut self, kind: Settle) -> Self {
        self.settle = Some(kind);
        self
    }
}

/// Commissioning found-state wait with a single "still looking" retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverStage {
    /// Shown while the app searches for the device
    pub searching: Locator,
    /// Shown when the search runs past its first budget
    pub still_looking: Locator,
    /// Dead-end screen reached when the device belongs to another assistant
    pub dead_end: Locator,
    /// First screen after a successful search
    pub connecting: Locator,
    pub timeout: Duration,
    pub retry_timeout: Duration,
    /// How long to wait for the screen that follows a finished search
    pub resolve_timeout: Duration,
}

/// Device list polling used by the zero-touch variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStage {
    /// Entry expected to show up in the device list
    pub target: Locator,
    pub device_name: String,
    /// Promotional overlay dismissed whenever it is seen
    pub overlay_dismiss: Vec<Locator>,
    pub budget: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Step(Step),
    Discover(DiscoverStage),
    PollForDevice(PollStage),
}

impl Stage {
    /// State the stage reaches on success
    pub fn state(&self) -> FlowState {
        match self {
            Stage::Step(step) => step.state,
            Stage::Discover(_) => FlowState::DeviceDiscovered,
            Stage::PollForDevice(_) => FlowState::DeviceDiscovered,
        }
    }
}

impl From<Step> for Stage {
    fn from(step: Step) -> Self {
        Stage::Step(step)
    }
}

/// Where on-screen error text is read after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSurface {
    /// No error surface; diagnostics are not captured
    None,
    Element(Locator),
}

/// A complete ordered flow for one variant
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub variant: FlowVariant,
    pub stages: Vec<Stage>,
    pub error_surface: ErrorSurface,
}

// Screen identifiers of the companion app
mod ids {
    pub const QUICK_ADD: &str = "com.amazon.dee.app:id/home_header_quick_add";
    pub const ADD_DEVICE_ITEM: &str = "1-primary";
    pub const ADD_DEVICES_LANDING: &str = "AddDevicesLandingPage";
    pub const BRAND_SELECTION: &str = "DiscoveryBrandSelectionPage";
    pub const INSTRUCTIONAL_TITLE: &str = "mosaic.pages.InstructionalPage-title";
    pub const INSTRUCTIONAL_NEXT: &str = "mosaic.pages.InstructionalPage-footer-primary-btn";
    pub const CONFIRMATION_TITLE: &str = "mosaic.pages.ConfirmationPage-title";
    pub const BASE_TEXT: &str = "mosaic.base_text";
    pub const TEXT: &str = "mosaic.text";
    pub const RADIO_ITEM: &str = "Mosaic.radio_list_item-primary";
    pub const NEW_DEVICE_FOUND: &str = "NewDeviceFoundPage";
    pub const UGS_ERROR_PAGE: &str = "UGS_ErrorPage";
    pub const CODE_ENTRY: &str = "mosaic.pages.CodeEntryPage-title";
    pub const SEARCH: &str = "com.amazon.dee.app:id/home_header_search";
    pub const SEARCH_INPUT: &str = "com.amazon.dee.app:id/search_input";
    pub const DEVICES_TAB: &str = "com.amazon.dee.app:id/tab_channels_device_icon";
    pub const DEVICES_PAGE: &str = "DevicesDashboardPage";
    pub const OVERLAY_CLOSE: &str = "gd-cancel-icon";
    pub const OVERLAY_SECONDARY: &str = "FullScreenTakeover::SecondaryButton";
    pub const DIALOG_CONFIRM: &str = "android:id/button1";
}

/// Device type row for development kits
const DEV_DEVICE_TYPE: &str = "Development Device";
/// Query typed into search to start zero-touch discovery
pub const DISCOVERY_QUERY: &str = "Discover devices";

/// Button-like text element on an instructional page
fn base_text(text: &str) -> Locator {
    Locator::id(ids::BASE_TEXT).with_text(text)
}

impl FlowDefinition {
    /// Build the flow table for `variant`
    pub fn for_variant(variant: FlowVariant, params: &FlowParams, config: &Config) -> Self {
        let stages = match variant {
            FlowVariant::Unguided => unguided(params, config),
            FlowVariant::Barcode => barcode(params, config),
            FlowVariant::Discovery => discovery(params, config),
            FlowVariant::Commissioning => commissioning(params, config),
        };
        let error_surface = match variant {
            FlowVariant::Unguided | FlowVariant::Barcode => {
                ErrorSurface::Element(Locator::id(ids::UGS_ERROR_PAGE))
            }
            FlowVariant::Commissioning => ErrorSurface::Element(Locator::id(ids::BASE_TEXT)),
            FlowVariant::Discovery => ErrorSurface::None,
        };
        Self {
            variant,
            stages,
            error_surface,
        }
    }

    /// States reached by the chain, in order
    pub fn states(&self) -> Vec<FlowState> {
        self.stages.iter().map(Stage::state).collect()
    }
}

/// App restart through brand selection, shared by the add-device variants
fn add_device_prefix(params: &FlowParams, config: &Config, brand_row: &str) -> Vec<Stage> {
    let t = &config.timeouts;
    vec![
        Step::gesture(
            FlowState::AppRestarted,
            Gesture::RestartApp(params.app_package.clone()),
        )
        .into(),
        Step::click(FlowState::AddDeviceMenuOpen, Locator::id(ids::QUICK_ADD))
            .settle(Settle::AppRestart)
            .appear(Locator::id(ids::ADD_DEVICE_ITEM), t.step())
            .into(),
        Step::click(FlowState::AddDeviceLandingOpen, Locator::id(ids::ADD_DEVICE_ITEM))
            .settle(Settle::Navigation)
            .appear(Locator::id(ids::ADD_DEVICES_LANDING), t.step())
            .into(),
        Step::gesture(
            FlowState::AddDeviceLandingOpen,
            Gesture::ScrollTo(DEV_DEVICE_TYPE.to_string()),
        )
        .into(),
        Step::click(
            FlowState::DeviceTypeSelected,
            Locator::id(format!("DeviceTypeRow_{DEV_DEVICE_TYPE}-primary")),
        )
        .appear(Locator::id(ids::BRAND_SELECTION), t.step())
        .into(),
        Step::click(FlowState::BrandOrMethodConfirmed, Locator::id(brand_row))
            .appear(Locator::id(ids::INSTRUCTIONAL_TITLE), t.step())
            .into(),
    ]
}

fn power_on(config: &Config) -> Stage {
    Step::click(FlowState::PoweredOnConfirmed, base_text("Yes"))
        .appear(Locator::id(ids::INSTRUCTIONAL_TITLE), config.timeouts.step())
        .into()
}

/// found → connecting, shared by unguided and barcode
fn ack_found_and_connect(config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;
    vec![
        Step::wait(FlowState::DeviceDiscovered)
            .disappear(base_text("Looking for your ACK development device"), t.long_poll())
            .into(),
        Step::wait(FlowState::DeviceConnecting)
            .disappear(base_text("Connecting to your ACK development device"), t.long_poll())
            .into(),
    ]
}

/// network-join → completion, shared by unguided and barcode
fn ack_join_and_complete(config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;
    vec![
        Step::wait(FlowState::NetworkJoining)
            .disappear(
                Locator::id(ids::BASE_TEXT)
                    .with_text_prefix("Connecting your ACK development device to"),
                t.long_poll(),
            )
            .into(),
        Step::wait(FlowState::Completed)
            .appear(Locator::id(ids::NEW_DEVICE_FOUND), t.completion())
            .into(),
    ]
}

fn unguided(params: &FlowParams, config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;
    let ssid = params.wifi_ssid.clone().unwrap_or_default();

    let mut stages = add_device_prefix(params, config, "DeviceBrandRow_ACK=0-primary");
    stages.push(power_on(config));
    stages.push(
        Step::click(FlowState::PairingCodeDeclined, base_text("Don't Have A Code?"))
            .appear(Locator::id(ids::INSTRUCTIONAL_TITLE), t.step())
            .into(),
    );
    stages.push(
        Step::click(FlowState::PairingCodeDeclined, Locator::id(ids::INSTRUCTIONAL_NEXT))
            .appear(Locator::id(ids::CONFIRMATION_TITLE), t.step())
            .into(),
    );
    stages.extend(ack_found_and_connect(config));
    stages.push(
        Step::click(
            FlowState::NetworkSelected,
            Locator::id(ids::RADIO_ITEM).with_text(ssid),
        )
        .settle(Settle::Navigation)
        .into(),
    );
    stages.push(Step::click(FlowState::NetworkSelected, Locator::text("Next")).into());
    stages.extend(ack_join_and_complete(config));
    stages
}

fn barcode(params: &FlowParams, config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;

    let mut stages = add_device_prefix(params, config, "DeviceBrandRow_ACK=0-primary");
    stages.push(power_on(config));
    stages.push(
        Step::click(FlowState::ScanPromptShown, Locator::id(ids::INSTRUCTIONAL_NEXT))
            .appear(
                Locator::id(ids::TEXT).with_text("Scan the 2D barcode for your development device"),
                t.step(),
            )
            .into(),
    );
    let mut tail = ack_found_and_connect(config);
    if let Some(Stage::Step(first)) = tail.first_mut() {
        first.settle = Some(Settle::Navigation);
    }
    stages.extend(tail);
    stages.extend(ack_join_and_complete(config));
    stages
}

fn discovery(params: &FlowParams, config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;
    vec![
        Step::gesture(
            FlowState::AppRestarted,
            Gesture::RestartApp(params.app_package.clone()),
        )
        .into(),
        Step::click(FlowState::SearchIssued, Locator::id(ids::SEARCH))
            .settle(Settle::AppRestart)
            .appear(Locator::id(ids::SEARCH_INPUT), t.step())
            .into(),
        Step::gesture(
            FlowState::SearchIssued,
            Gesture::EnterText(DISCOVERY_QUERY.to_string()),
        )
        .into(),
        Step::click(FlowState::DeviceListOpen, Locator::id(ids::DEVICES_TAB))
            .settle(Settle::Navigation)
            .appear(Locator::id(ids::DEVICES_PAGE), t.step())
            .into(),
        Stage::PollForDevice(PollStage {
            target: Locator::id(ids::TEXT).with_text(params.device_name.clone()),
            device_name: params.device_name.clone(),
            overlay_dismiss: vec![
                Locator::id(ids::OVERLAY_CLOSE),
                Locator::id(ids::OVERLAY_SECONDARY),
            ],
            budget: t.discovery_poll(),
            interval: t.discovery_refresh(),
        }),
    ]
}

fn commissioning(params: &FlowParams, config: &Config) -> Vec<Stage> {
    let t = &config.timeouts;
    let code = params.pairing_code.clone().unwrap_or_default();

    let mut stages = add_device_prefix(params, config, "DeviceBrandRow_Matter=0-primary");
    stages.push(
        Step::click(FlowState::LogoConfirmed, base_text("Yes"))
            .appear(Locator::id(ids::INSTRUCTIONAL_TITLE), t.step())
            .into(),
    );
    stages.push(power_on(config));
    stages.push(
        Step::click(FlowState::NumericCodeChosen, base_text("Try Numeric Code"))
            .appear(Locator::id(ids::CODE_ENTRY), t.step())
            .into(),
    );
    stages.push(Step::gesture(FlowState::CodeEntered, Gesture::EnterText(code)).into());
    let connecting = base_text("Connecting to your Matter device");
    stages.push(Stage::Discover(DiscoverStage {
        searching: base_text("Looking for your Matter device"),
        still_looking: base_text("Still looking..."),
        dead_end: Locator::id(ids::BASE_TEXT)
            .with_text_prefix("This device is already set up with another assistant"),
        connecting: connecting.clone(),
        timeout: t.found(),
        retry_timeout: t.still_looking(),
        resolve_timeout: t.step(),
    }));
    stages.push(
        Step::wait(FlowState::DeviceConnecting)
            .disappear(connecting, t.long_poll())
            .into(),
    );
    stages.push(
        Step::wait(FlowState::NetworkJoining)
            .disappear(
                Locator::id(ids::BASE_TEXT).with_text_prefix("Connecting your Matter device to"),
                t.long_poll(),
            )
            .into(),
    );
    stages.push(
        Step::wait(FlowState::ReadinessPreparing)
            .disappear(
                Locator::id(ids::BASE_TEXT).with_text_prefix("Getting your device ready"),
                t.long_poll(),
            )
            .into(),
    );
    stages.push(
        Step::wait(FlowState::Completed)
            .appear(Locator::id(ids::NEW_DEVICE_FOUND), t.completion())
            .into(),
    );
    stages
}

/// Locators used by the cleanup flow
pub mod reset_ids {
    pub use super::ids::{DEVICES_TAB, DIALOG_CONFIRM, TEXT};
    pub const SETTINGS: &str = "Settings";
    pub const DELETE: &str = "Delete";
}
