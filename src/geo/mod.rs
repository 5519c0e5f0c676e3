use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn validate_point(field: &str, point: &GeoPoint) -> Result<(), String> {
    if !point.lat.is_finite() || !(-90.0..=90.0).contains(&point.lat) {
        return Err(format!("{field}.lat must be within [-90, 90], got {}", point.lat));
    }
    if !point.lng.is_finite() || !(-180.0..=180.0).contains(&point.lng) {
        return Err(format!("{field}.lng must be within [-180, 180], got {}", point.lng));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{haversine_km, validate_point};
    use crate::models::driver::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 30.0444,
            lng: 31.2357,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn cairo_to_alexandria_is_around_180_km() {
        let cairo = GeoPoint {
            lat: 30.0444,
            lng: 31.2357,
        };
        let alexandria = GeoPoint {
            lat: 31.2001,
            lng: 29.9187,
        };
        let distance = haversine_km(&cairo, &alexandria);
        assert!((distance - 180.0).abs() < 10.0);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let ok = GeoPoint { lat: 90.0, lng: -180.0 };
        let bad_lat = GeoPoint { lat: 91.0, lng: 0.0 };
        let bad_lng = GeoPoint {
            lat: 0.0,
            lng: f64::INFINITY,
        };

        assert!(validate_point("pickup", &ok).is_ok());
        assert!(validate_point("pickup", &bad_lat).is_err());
        assert!(validate_point("dropoff", &bad_lng).is_err());
    }
}
