use crate::layout::RouteStyle;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ZOOM_PRESETS: [f32; 9] = [25.0, 50.0, 75.0, 100.0, 125.0, 150.0, 200.0, 300.0, 400.0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub base_x: f32,
    pub base_y: f32,
    pub level_height: f32,
    pub column_width: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_x: 50.0,
            base_y: 50.0,
            level_height: 150.0,
            column_width: 200.0,
        }
    }
}

/// Zoom levels are percentages: `100.0` is a 1:1 world/screen scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub default_zoom: f32,
    pub presets: Vec<f32>,
    pub fit_padding: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 25.0,
            max_zoom: 400.0,
            default_zoom: 100.0,
            presets: ZOOM_PRESETS.to_vec(),
            fit_padding: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub default_style: RouteStyle,
    pub curve_factor: f32,
    pub self_loop_size: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_style: RouteStyle::Curved,
            curve_factor: 0.5,
            self_loop_size: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Zoom change, in percentage points, per wheel notch.
    pub wheel_zoom_step: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            wheel_zoom_step: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub auto_step_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            auto_step_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub viewport: ViewportConfig,
    pub routing: RoutingConfig,
    pub interaction: InteractionConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    base_x: Option<f32>,
    base_y: Option<f32>,
    level_height: Option<f32>,
    column_width: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ViewportConfigFile {
    min_zoom: Option<f32>,
    max_zoom: Option<f32>,
    default_zoom: Option<f32>,
    presets: Option<Vec<f32>>,
    fit_padding: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RoutingConfigFile {
    default_style: Option<RouteStyle>,
    curve_factor: Option<f32>,
    self_loop_size: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InteractionConfigFile {
    wheel_zoom_step: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SimulationConfigFile {
    auto_step_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    layout: Option<LayoutConfigFile>,
    viewport: Option<ViewportConfigFile>,
    routing: Option<RoutingConfigFile>,
    interaction: Option<InteractionConfigFile>,
    simulation: Option<SimulationConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parses a JSON5 (or plain JSON) config document and merges it onto the
/// defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.base_x {
            config.layout.base_x = v;
        }
        if let Some(v) = layout.base_y {
            config.layout.base_y = v;
        }
        if let Some(v) = layout.level_height {
            config.layout.level_height = v;
        }
        if let Some(v) = layout.column_width {
            config.layout.column_width = v;
        }
    }

    if let Some(viewport) = parsed.viewport {
        if let Some(v) = viewport.min_zoom {
            config.viewport.min_zoom = v;
        }
        if let Some(v) = viewport.max_zoom {
            config.viewport.max_zoom = v;
        }
        if let Some(v) = viewport.default_zoom {
            config.viewport.default_zoom = v;
        }
        if let Some(mut v) = viewport.presets {
            v.sort_by(|a, b| a.total_cmp(b));
            v.dedup();
            config.viewport.presets = v;
        }
        if let Some(v) = viewport.fit_padding {
            config.viewport.fit_padding = v;
        }
    }

    if let Some(routing) = parsed.routing {
        if let Some(v) = routing.default_style {
            config.routing.default_style = v;
        }
        if let Some(v) = routing.curve_factor {
            config.routing.curve_factor = v;
        }
        if let Some(v) = routing.self_loop_size {
            config.routing.self_loop_size = v;
        }
    }

    if let Some(interaction) = parsed.interaction {
        if let Some(v) = interaction.wheel_zoom_step {
            config.interaction.wheel_zoom_step = v;
        }
    }

    if let Some(simulation) = parsed.simulation {
        if let Some(v) = simulation.auto_step_interval_ms {
            config.simulation.auto_step_interval_ms = v;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    let viewport = &config.viewport;
    if !(viewport.min_zoom > 0.0 && viewport.min_zoom <= viewport.max_zoom) {
        anyhow::bail!(
            "viewport zoom bounds must satisfy 0 < minZoom <= maxZoom (got {} and {})",
            viewport.min_zoom,
            viewport.max_zoom
        );
    }
    if !(viewport.fit_padding > 0.0 && viewport.fit_padding <= 1.0) {
        anyhow::bail!("viewport fitPadding must lie in (0, 1]");
    }
    if !viewport.default_zoom.is_finite() {
        anyhow::bail!("viewport defaultZoom must be finite");
    }
    let layout = &config.layout;
    if !(layout.level_height > 0.0 && layout.column_width > 0.0) {
        anyhow::bail!("layout levelHeight and columnWidth must be positive");
    }
    if !(layout.base_x.is_finite() && layout.base_y.is_finite()) {
        anyhow::bail!("layout baseX and baseY must be finite");
    }
    let routing = &config.routing;
    if !(routing.curve_factor.is_finite() && routing.self_loop_size.is_finite()) {
        anyhow::bail!("routing curveFactor and selfLoopSize must be finite");
    }
    if !(config.interaction.wheel_zoom_step > 0.0) {
        anyhow::bail!("interaction wheelZoomStep must be positive");
    }
    if config.simulation.auto_step_interval_ms == 0 {
        anyhow::bail!("simulation autoStepIntervalMs must be positive");
    }
    Ok(())
}
