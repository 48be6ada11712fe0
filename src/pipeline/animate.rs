use std::io::Cursor;

use apng::{create_config, image_png, Encoder, Frame, PNGImage};
use rayon::prelude::*;

use crate::error::RasterError;
use crate::pipeline::render::{self, MapFrame};
use crate::pipeline::{rasterize, route};
use crate::types::geo::ViewportPosition;
use crate::types::map::MapOptions;
use crate::types::tracking::RouteView;

const MIN_FRAMES: u32 = 8;
const MIN_FRAME_DELAY_MS: u32 = 16;

/// Looping preview of the whole flight: the marker sweeps the synthetic
/// route from pickup to drop-off, leaving a trail behind it.
pub fn render_preview_apng(view: &RouteView, options: &MapOptions) -> Result<Vec<u8>, RasterError> {
    let frame_count = options.frames.clamp(MIN_FRAMES, MapOptions::MAX_FRAMES);
    let canvas = options.canvas();

    let frames: Vec<PNGImage> = (0..frame_count)
        .into_par_iter()
        .map(|idx| {
            let t = idx as f64 / (frame_count - 1) as f64;
            let frame_view = preview_view(view, t);
            let caption = format!("{:.0}%", t * 100.0);

            let svg = render::render_map_svg(
                &MapFrame {
                    view: &frame_view,
                    progress: t,
                    caption: &caption,
                },
                options,
            )
            .map_err(|err| {
                RasterError::AnimationFailed(format!("Failed to render preview frame {}: {}", idx, err))
            })?;

            let png_bytes = rasterize::rasterize(&svg, &canvas)?;
            png_image_from_bytes(&png_bytes, idx)
        })
        .collect::<Result<Vec<_>, RasterError>>()?;

    let config = create_config(&frames, None)
        .map_err(|err| RasterError::AnimationFailed(format!("Failed to build APNG config: {}", err)))?;

    let mut output_bytes = Vec::new();
    {
        let mut cursor = Cursor::new(&mut output_bytes);
        let mut encoder = Encoder::new(&mut cursor, config)
            .map_err(|err| RasterError::AnimationFailed(format!("Failed to create APNG encoder: {}", err)))?;
        let delay_ms = options.frame_delay_ms.max(MIN_FRAME_DELAY_MS);
        let frame = Frame {
            delay_num: Some(delay_ms.min(u16::MAX as u32) as u16),
            delay_den: Some(1000),
            ..Default::default()
        };
        encoder.encode_all(frames, Some(&frame)).map_err(|err| {
            RasterError::AnimationFailed(format!("Failed to encode APNG frames: {}", err))
        })?;
    }

    tracing::debug!("Rendered {} preview frames for order {}", frame_count, view.order_id);
    Ok(output_bytes)
}

/// The route view as it looks when the drone is at fraction `t` of the
/// flight path.
pub fn preview_view(view: &RouteView, t: f64) -> RouteView {
    let marker = route::point_along(&view.flight_path, t).unwrap_or(view.origin);
    RouteView {
        order_id: view.order_id.clone(),
        flight_path: view.flight_path.clone(),
        trail: reveal_path(&view.flight_path, t),
        origin: view.origin,
        destination: view.destination,
        marker,
    }
}

/// Prefix of `path` covering fraction `t` of its length, ending exactly at
/// the cut point.
fn reveal_path(path: &[ViewportPosition], t: f64) -> Vec<ViewportPosition> {
    let Some(first) = path.first().copied() else {
        return Vec::new();
    };
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    if t >= 1.0 {
        return path.to_vec();
    }

    let segment_lengths: Vec<f64> = path.windows(2).map(|pair| distance_2d(pair[0], pair[1])).collect();
    let total_length: f64 = segment_lengths.iter().sum();
    if total_length <= f64::EPSILON {
        return vec![first];
    }

    let target_length = total_length * t;
    let mut traveled = 0.0;
    let mut out = vec![first];
    for (idx, segment_length) in segment_lengths.iter().copied().enumerate() {
        if segment_length <= f64::EPSILON {
            continue;
        }
        let next_traveled = traveled + segment_length;
        if next_traveled < target_length {
            out.push(path[idx + 1]);
            traveled = next_traveled;
            continue;
        }
        let local_t = ((target_length - traveled) / segment_length).clamp(0.0, 1.0);
        let (a, b) = (path[idx], path[idx + 1]);
        out.push(ViewportPosition::new(
            a.left + (b.left - a.left) * local_t,
            a.top + (b.top - a.top) * local_t,
        ));
        return out;
    }
    path.to_vec()
}

fn distance_2d(a: ViewportPosition, b: ViewportPosition) -> f64 {
    let dx = b.left - a.left;
    let dy = b.top - a.top;
    (dx * dx + dy * dy).sqrt()
}

fn png_image_from_bytes(png_bytes: &[u8], frame_idx: u32) -> Result<PNGImage, RasterError> {
    let decoder = image_png::Decoder::new(Cursor::new(png_bytes));
    let mut reader = decoder.read_info().map_err(|err| {
        RasterError::AnimationFailed(format!(
            "Failed to decode PNG metadata for frame {}: {}",
            frame_idx, err
        ))
    })?;
    let mut data = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut data).map_err(|err| {
        RasterError::AnimationFailed(format!(
            "Failed to decode PNG pixels for frame {}: {}",
            frame_idx, err
        ))
    })?;
    data.truncate(info.buffer_size());

    Ok(PNGImage {
        width: info.width,
        height: info.height,
        data,
        color_type: info.color_type,
        bit_depth: info.bit_depth,
    })
}
