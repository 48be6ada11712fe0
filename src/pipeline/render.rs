use crate::error::RenderError;
use crate::types::geo::ViewportPosition;
use crate::types::map::{MapOptions, Theme};
use crate::types::tracking::RouteView;

const COLOR_BUCKETS: usize = 32;
const FLIGHT_PATH_DASH: &str = "10 8";
const PROGRESS_BAR_HEIGHT: f64 = 8.0;
const ROTOR_OFFSET_RATIO: f64 = 0.9;

/// Frame-independent inputs for one map image.
pub struct MapFrame<'a> {
    pub view: &'a RouteView,
    pub progress: f64,
    pub caption: &'a str,
}

/// Viewport-to-pixel mapping for the drawable area inside the padding.
#[derive(Clone, Copy)]
struct Frame {
    padding: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn project(&self, p: ViewportPosition) -> (f64, f64) {
        (
            self.padding + p.left / 100.0 * self.width,
            self.padding + p.top / 100.0 * self.height,
        )
    }
}

pub fn render_map_svg(frame: &MapFrame<'_>, options: &MapOptions) -> Result<String, RenderError> {
    let width = options.width as f64;
    let height = options.height as f64;
    let padding = options.padding as f64;
    let view = Frame {
        padding,
        width: width - 2.0 * padding,
        height: height - 2.0 * padding,
    };
    if view.width <= 0.0 || view.height <= 0.0 {
        return Err(RenderError::SvgError("Invalid viewport size".to_string()));
    }
    if frame.view.flight_path.is_empty() {
        return Err(RenderError::SvgError("Flight path is empty".to_string()));
    }

    let theme = &options.theme;
    let stroke = options.stroke_width as f64;

    let flight_coords: Vec<(f64, f64)> = frame.view.flight_path.iter().map(|p| view.project(*p)).collect();
    let flight_path = format!(
        r#"<path d="{}" fill="none" stroke="{}" stroke-opacity="0.7" stroke-width="{:.1}" stroke-dasharray="{}" stroke-linecap="round" stroke-linejoin="round"/>"#,
        build_polyline_path(&flight_coords),
        theme.flight_path,
        (stroke * 0.5).max(1.0),
        FLIGHT_PATH_DASH
    );

    let mut trail_coords: Vec<(f64, f64)> = frame.view.trail.iter().map(|p| view.project(*p)).collect();
    let marker = view.project(frame.view.marker);
    if trail_coords.last() != Some(&marker) {
        trail_coords.push(marker);
    }
    let trail = build_segment_paths(&trail_coords, stroke, theme);
    let trail_glow = if options.glow && !trail.is_empty() {
        format!(
            r#"<g filter="url(#glow)" opacity="0.55">{}</g>"#,
            build_segment_paths(&trail_coords, stroke * 2.4, theme)
        )
    } else {
        String::new()
    };

    let pins = render_endpoint_pins(
        view.project(frame.view.origin),
        view.project(frame.view.destination),
        stroke * 2.2,
        theme,
    );
    let drone = render_drone(marker, stroke * 2.0, theme);
    let progress_bar = render_progress_bar(frame.progress, &view, height, theme);
    let caption = render_caption(frame.caption, padding, theme);

    Ok(format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
  <defs>
    {}
    {}
  </defs>
  {}
  {}
  {}
  {}
  {}
  {}
  {}
</svg>"#,
        width,
        height,
        width,
        height,
        create_linear_gradient("trailGradient", theme),
        glow_filter_def(options.glow),
        flight_path,
        trail_glow,
        trail,
        pins,
        drone,
        progress_bar,
        caption
    ))
}

fn glow_filter_def(enabled: bool) -> String {
    if !enabled {
        return String::new();
    }
    r#"<filter id="glow" x="-20%" y="-20%" width="140%" height="140%">
      <feGaussianBlur stdDeviation="5" result="blur"/>
      <feMerge>
        <feMergeNode in="blur"/>
        <feMergeNode in="SourceGraphic"/>
      </feMerge>
    </filter>"#
        .to_string()
}

fn create_linear_gradient(id: &str, theme: &Theme) -> String {
    format!(
        r#"<linearGradient id="{}" x1="0%" y1="0%" x2="100%" y2="0%">
      <stop offset="0%" style="stop-color:{};stop-opacity:1" />
      <stop offset="100%" style="stop-color:{};stop-opacity:1" />
    </linearGradient>"#,
        id,
        theme.interpolate(0.0),
        theme.interpolate(1.0)
    )
}

fn render_endpoint_pins(origin: (f64, f64), destination: (f64, f64), radius: f64, theme: &Theme) -> String {
    format!(
        r##"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" opacity="0.95"/>
  <circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="none" stroke="{}" stroke-width="{:.1}"/>
  <circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" opacity="0.95"/>"##,
        origin.0,
        origin.1,
        radius,
        theme.origin_pin,
        destination.0,
        destination.1,
        radius * 1.8,
        theme.destination_pin,
        (radius * 0.35).max(1.0),
        destination.0,
        destination.1,
        radius,
        theme.destination_pin
    )
}

/// Body plus four rotors.
fn render_drone(at: (f64, f64), size: f64, theme: &Theme) -> String {
    let offset = size * ROTOR_OFFSET_RATIO;
    let rotors: String = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)]
        .iter()
        .map(|(dx, dy)| {
            format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="none" stroke="{}" stroke-width="1.5"/>"#,
                at.0 + dx * offset,
                at.1 + dy * offset,
                size * 0.45,
                theme.marker
            )
        })
        .collect();
    format!(
        r##"<g>{}<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}" stroke="#FFFFFF" stroke-width="2"/></g>"##,
        rotors,
        at.0,
        at.1,
        size * 0.6,
        theme.marker
    )
}

fn render_progress_bar(progress: f64, view: &Frame, height: f64, theme: &Theme) -> String {
    let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) };
    let y = height - view.padding * 0.5 - PROGRESS_BAR_HEIGHT * 0.5;
    format!(
        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.1}" rx="{:.1}" fill="{}" fill-opacity="0.15"/>
  <rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.1}" rx="{:.1}" fill="url(#trailGradient)"/>"#,
        view.padding,
        y,
        view.width,
        PROGRESS_BAR_HEIGHT,
        PROGRESS_BAR_HEIGHT * 0.5,
        theme.text,
        view.padding,
        y,
        view.width * progress,
        PROGRESS_BAR_HEIGHT,
        PROGRESS_BAR_HEIGHT * 0.5
    )
}

fn render_caption(caption: &str, padding: f64, theme: &Theme) -> String {
    if caption.trim().is_empty() {
        return String::new();
    }
    let font_size = (padding * 0.35).clamp(11.0, 28.0);
    format!(
        r#"<text x="{:.2}" y="{:.2}" font-family="DejaVu Sans, sans-serif" font-size="{:.0}" fill="{}">{}</text>"#,
        padding,
        padding * 0.5 + font_size * 0.35,
        font_size,
        theme.text,
        escape_xml(caption)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_polyline_path(points: &[(f64, f64)]) -> String {
    points.iter().enumerate().fold(String::new(), |mut s, (i, (x, y))| {
        if i == 0 {
            s.push_str(&format!("M {:.2} {:.2}", x, y));
        } else {
            s.push_str(&format!(" L {:.2} {:.2}", x, y));
        }
        s
    })
}

/// Trail segments colored from oldest to newest, batched into a fixed
/// number of color buckets to keep the SVG small.
fn build_segment_paths(coords: &[(f64, f64)], stroke_width: f64, theme: &Theme) -> String {
    if coords.len() < 2 {
        return String::new();
    }
    let mut bucket_commands = vec![String::new(); COLOR_BUCKETS];
    let last_segment = (coords.len() - 2).max(1) as f64;
    for (i, pair) in coords.windows(2).enumerate() {
        let (x1, y1) = pair[0];
        let (x2, y2) = pair[1];
        let t = if coords.len() == 2 { 1.0 } else { i as f64 / last_segment };
        let bucket = ((t * (COLOR_BUCKETS - 1) as f64).round() as usize).min(COLOR_BUCKETS - 1);
        bucket_commands[bucket].push_str(&format!(" M {:.2} {:.2} L {:.2} {:.2}", x1, y1, x2, y2));
    }

    let mut paths = String::new();
    for (bucket, commands) in bucket_commands.into_iter().enumerate() {
        if commands.is_empty() {
            continue;
        }
        let t = bucket as f64 / (COLOR_BUCKETS - 1) as f64;
        paths.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="{:.1}" stroke-linecap="round" stroke-linejoin="round"/>"#,
            commands.trim(),
            theme.interpolate(t),
            stroke_width
        ));
    }
    paths
}
