use rustc_hash::FxHashMap;

use interchange_model::Shape;

use crate::txc::{JourneyPattern, Location, RouteSection, StopPoint, TxcDocument, TxcRoute};

/// Build one shape per journey pattern from the concatenated RouteLink
/// geometry of its route. Links without track points fall back to the
/// endpoint stop locations, so a shape degrades to the stop polyline rather
/// than vanishing.
pub(crate) fn shape_for_pattern(
    shape_id: &str,
    pattern: &JourneyPattern,
    document: &TxcDocument,
) -> Vec<Shape> {
    let sections: FxHashMap<&str, &RouteSection> = document
        .route_sections
        .iter()
        .map(|section| (section.id.as_str(), section))
        .collect();
    let stops: FxHashMap<&str, &StopPoint> = document
        .stop_points
        .iter()
        .map(|stop| (stop.atco_code.as_str(), stop))
        .collect();
    let route: Option<&TxcRoute> = pattern
        .route_ref
        .as_deref()
        .and_then(|route_ref| document.routes.iter().find(|route| route.id == route_ref));

    let mut points: Vec<Location> = Vec::new();
    let mut push = |location: Location| {
        // Collapse consecutive duplicates where sections share endpoints.
        if points.last() != Some(&location) {
            points.push(location);
        }
    };

    if let Some(route) = route {
        for section_ref in &route.route_section_refs {
            let Some(section) = sections.get(section_ref.as_str()) else {
                continue;
            };
            for link in &section.links {
                if link.track.is_empty() {
                    if let Some(stop) = stops.get(link.from_stop.as_str()) {
                        if let Some(location) = stop.location {
                            push(location);
                        }
                    }
                    if let Some(stop) = stops.get(link.to_stop.as_str()) {
                        if let Some(location) = stop.location {
                            push(location);
                        }
                    }
                } else {
                    for &location in &link.track {
                        push(location);
                    }
                }
            }
        }
    }

    points
        .into_iter()
        .enumerate()
        .map(|(index, location)| Shape {
            shape_id: shape_id.to_string(),
            shape_pt_lat: location.latitude,
            shape_pt_lon: location.longitude,
            shape_pt_sequence: index as u32 + 1,
            shape_dist_traveled: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txc::RouteLink;

    fn location(latitude: f64, longitude: f64) -> Location {
        Location {
            latitude,
            longitude,
        }
    }

    fn document_with_track() -> TxcDocument {
        let mut document = TxcDocument::default();
        document.route_sections.push(RouteSection {
            id: "RS1".into(),
            links: vec![
                RouteLink {
                    id: "RL1".into(),
                    from_stop: "A".into(),
                    to_stop: "B".into(),
                    track: vec![location(51.0, -0.1), location(51.1, -0.2)],
                    ..Default::default()
                },
                RouteLink {
                    id: "RL2".into(),
                    from_stop: "B".into(),
                    to_stop: "C".into(),
                    track: vec![location(51.1, -0.2), location(51.2, -0.3)],
                    ..Default::default()
                },
            ],
        });
        document.routes.push(TxcRoute {
            id: "R1".into(),
            route_section_refs: vec!["RS1".into()],
            ..Default::default()
        });
        document
    }

    #[test]
    fn concatenates_link_tracks_without_duplicate_joints() {
        let document = document_with_track();
        let pattern = JourneyPattern {
            id: "JP1".into(),
            route_ref: Some("R1".into()),
            ..Default::default()
        };
        let shape = shape_for_pattern("JP1", &pattern, &document);

        assert_eq!(shape.len(), 3);
        assert_eq!(shape[0].shape_pt_sequence, 1);
        assert_eq!(shape[2].shape_pt_sequence, 3);
        assert_eq!(shape[2].shape_pt_lat, 51.2);
        assert!(shape.iter().all(|point| point.shape_id == "JP1"));
    }

    #[test]
    fn missing_route_ref_yields_empty_shape() {
        let document = document_with_track();
        let pattern = JourneyPattern {
            id: "JP2".into(),
            ..Default::default()
        };
        assert!(shape_for_pattern("JP2", &pattern, &document).is_empty());
    }
}
