use serde::Serialize;

/// Colors for one look of the tracking map. `trail` runs from the oldest
/// breadcrumb to the drone.
#[derive(Debug, Clone, Serialize)]
pub struct Theme {
    pub name: &'static str,
    pub trail: Vec<&'static str>,
    pub flight_path: &'static str,
    pub origin_pin: &'static str,
    pub destination_pin: &'static str,
    pub marker: &'static str,
    pub text: &'static str,
    pub background: (u8, u8, u8, u8),
}

impl Theme {
    pub fn get(name: &str) -> Option<Self> {
        match name {
            "day" => Some(Self::day()),
            "night" => Some(Self {
                name: "night",
                trail: vec!["#0055FF", "#0099DD", "#00D1FF"],
                flight_path: "#5C6B80",
                origin_pin: "#FF9933",
                destination_pin: "#00FF94",
                marker: "#FFFFFF",
                text: "#E6EDF3",
                background: (13, 17, 23, 255),
            }),
            "mono" => Some(Self {
                name: "mono",
                trail: vec!["#444444", "#222222", "#000000"],
                flight_path: "#9E9E9E",
                origin_pin: "#000000",
                destination_pin: "#000000",
                marker: "#000000",
                text: "#000000",
                background: (255, 255, 255, 255),
            }),
            _ => None,
        }
    }

    fn day() -> Self {
        Self {
            name: "day",
            trail: vec!["#FF3366", "#FF6600", "#FF9933"],
            flight_path: "#8A94A6",
            origin_pin: "#FF3366",
            destination_pin: "#1D976C",
            marker: "#0055FF",
            text: "#1F2933",
            background: (244, 246, 248, 255),
        }
    }

    pub fn interpolate(&self, t: f64) -> String {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let stops = &self.trail;
        match stops.len() {
            0 => return "#FFFFFF".to_string(),
            1 => return stops[0].to_string(),
            _ => {}
        }
        let scaled = t * (stops.len() - 1) as f64;
        let idx = (scaled.floor() as usize).min(stops.len() - 2);
        let local_t = scaled - idx as f64;
        let start = parse_hex_color(stops[idx]).unwrap_or((255, 255, 255));
        let end = parse_hex_color(stops[idx + 1]).unwrap_or((255, 255, 255));
        format!(
            "#{:02X}{:02X}{:02X}",
            lerp_u8(start.0, end.0, local_t),
            lerp_u8(start.1, end.1, local_t),
            lerp_u8(start.2, end.2, local_t)
        )
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::day()
    }
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let value = hex.trim_start_matches('#');
    if value.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&value[0..2], 16).ok()?;
    let g = u8::from_str_radix(&value[2..4], 16).ok()?;
    let b = u8::from_str_radix(&value[4..6], 16).ok()?;
    Some((r, g, b))
}

fn lerp_u8(start: u8, end: u8, t: f64) -> u8 {
    (start as f64 + (end as f64 - start as f64) * t).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone)]
pub struct MapOptions {
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    pub stroke_width: f32,
    pub glow: bool,
    pub theme: Theme,
    pub frames: u32,
    pub frame_delay_ms: u32,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            width: 720,
            height: 720,
            padding: 48,
            stroke_width: 4.0,
            glow: true,
            theme: Theme::default(),
            frames: 24,
            frame_delay_ms: 80,
        }
    }
}

impl MapOptions {
    pub const MIN_SIZE: u32 = 160;
    pub const MAX_SIZE: u32 = 2048;
    pub const MAX_FRAMES: u32 = 120;

    /// Canvas the SVG is rasterized onto.
    pub fn canvas(&self) -> MapCanvas {
        MapCanvas {
            width: self.width,
            height: self.height,
            background: Some(self.theme.background),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapCanvas {
    pub width: u32,
    pub height: u32,
    pub background: Option<(u8, u8, u8, u8)>,
}
