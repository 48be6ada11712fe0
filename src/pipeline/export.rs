use std::io::Cursor;

use chrono::Datelike;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ExportError;
use crate::pipeline::session::TrackingSession;

const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
const CREATOR: &str = concat!("dronetrack-rs ", env!("CARGO_PKG_VERSION"));

/// Writes the session's breadcrumb trail as a single-track GPX 1.1 document.
pub fn trail_to_gpx(session: &TrackingSession) -> Result<String, ExportError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write(
        &mut writer,
        Event::Start(
            BytesStart::new("gpx").with_attributes([
                ("version", "1.1"),
                ("creator", CREATOR),
                ("xmlns", GPX_NAMESPACE),
            ]),
        ),
    )?;

    // xsd:dateTime only takes four-digit years.
    if (0..=9999).contains(&session.created_at.year()) {
        write(&mut writer, Event::Start(BytesStart::new("metadata")))?;
        text_element(&mut writer, "time", &session.created_at.to_rfc3339())?;
        write(&mut writer, Event::End(BytesEnd::new("metadata")))?;
    }

    write(&mut writer, Event::Start(BytesStart::new("trk")))?;
    let name = match &session.restaurant_name {
        Some(restaurant) => format!("Order {} from {}", session.order_id, restaurant),
        None => format!("Order {}", session.order_id),
    };
    text_element(&mut writer, "name", &name)?;
    write(&mut writer, Event::Start(BytesStart::new("trkseg")))?;
    for point in session.trail.points() {
        let lat = format!("{:.6}", point.latitude);
        let lon = format!("{:.6}", point.longitude);
        write(
            &mut writer,
            Event::Empty(BytesStart::new("trkpt").with_attributes([("lat", lat.as_str()), ("lon", lon.as_str())])),
        )?;
    }
    write(&mut writer, Event::End(BytesEnd::new("trkseg")))?;
    write(&mut writer, Event::End(BytesEnd::new("trk")))?;
    write(&mut writer, Event::End(BytesEnd::new("gpx")))?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| ExportError::Xml(e.to_string()))
}

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<(), ExportError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::Xml(e.to_string()))
}
