//! Batch-scoped device and location fingerprint.
//!
//! Every image in one batch is stamped as if it came from the same physical phone standing
//! in the same place. A [`Session`] holds that identity; a [`SessionSlot`] memoizes it for
//! the duration of one batch and is reset before the next one starts.

pub mod catalog;

use rand::Rng;
use rand::seq::IndexedRandom;

pub use catalog::{City, DeviceProfile, Region, DEFAULT_REGION, DEVICES, REGIONS};

/// Alphabet for device serials. `I` and `O` are left out because they read as `1` and `0`.
const SERIAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ0123456789";
const DEVICE_SERIAL_PREFIX: &str = "F2L";
const DEVICE_SERIAL_BODY_LEN: usize = 9;
const LENS_SERIAL_PREFIX: char = 'L';

/// Hard upper bound for the one-off location offset, in metres.
pub const MAX_JITTER_RADIUS_M: f64 = 500.0;

const METRES_PER_DEGREE_LAT: f64 = 111_320.0;

/// A latitude/longitude pair in signed decimal degrees, plus altitude in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, latitude: f64, longitude: f64) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (self.latitude.to_radians(), latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// One consistent device identity and location, shared by every image in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub device: &'static DeviceProfile,
    pub device_serial: String,
    pub lens_serial: String,
    pub region: &'static Region,
    pub city: &'static City,
    pub geo_center: GeoPoint,
}

impl Session {
    /// Create a fresh session for `region_key`.
    ///
    /// Device and city are picked uniformly from their catalogs; the city coordinate is then
    /// moved once by up to `jitter_radius_m` metres (clamped to [`MAX_JITTER_RADIUS_M`]).
    /// Unknown region keys fall back to [`DEFAULT_REGION`].
    pub fn create<R: Rng + ?Sized>(region_key: &str, jitter_radius_m: f64, rng: &mut R) -> Self {
        let region = catalog::region(region_key);
        if !catalog::is_known_region(region_key) {
            log::warn!(
                "Unknown region '{region_key}', falling back to '{}'",
                region.key
            );
        }

        // Catalog slices are never empty
        let device = DEVICES.choose(rng).unwrap_or(&DEVICES[0]);
        let city = region.cities.choose(rng).unwrap_or(&region.cities[0]);

        let radius = jitter_radius_m.clamp(0.0, MAX_JITTER_RADIUS_M);
        let geo_center = jitter(city, radius, rng);

        let session = Self {
            device,
            device_serial: device_serial(rng),
            lens_serial: lens_serial(rng),
            region,
            city,
            geo_center,
        };

        log::info!(
            "New session: {} ({}) near {}, {} at {:.4}, {:.4}",
            session.device.model,
            session.device_serial,
            session.city.name,
            session.region.country,
            session.geo_center.latitude,
            session.geo_center.longitude,
        );

        session
    }

    /// Whole-hour UTC offset of the session location, derived from longitude.
    pub fn utc_offset_hours(&self) -> i32 {
        utc_offset_hours(self.geo_center.longitude)
    }
}

/// Batch-scoped memo for the current [`Session`].
///
/// Create one per batch (or call [`SessionSlot::reset`] at batch start). The first
/// [`SessionSlot::get_or_create`] call builds the session; later calls return the same one.
/// Concurrent batches each own their slot, so nothing here is process-global.
#[derive(Debug)]
pub struct SessionSlot {
    session: Option<Session>,
    jitter_radius_m: f64,
}

impl SessionSlot {
    pub fn new(jitter_radius_m: f64) -> Self {
        Self {
            session: None,
            jitter_radius_m,
        }
    }

    /// Return the batch session, creating it on first use.
    ///
    /// `region_key` is only consulted when the session is created; a slot that already holds
    /// a session ignores it.
    pub fn get_or_create<R: Rng + ?Sized>(&mut self, region_key: &str, rng: &mut R) -> &Session {
        let radius = self.jitter_radius_m;
        self.session
            .get_or_insert_with(|| Session::create(region_key, radius, rng))
    }

    /// Forget the current session so the next batch gets a fresh identity.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Session reset");
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

/// `F2L` followed by nine characters from [`SERIAL_ALPHABET`].
pub fn device_serial<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut serial = String::with_capacity(DEVICE_SERIAL_PREFIX.len() + DEVICE_SERIAL_BODY_LEN);
    serial.push_str(DEVICE_SERIAL_PREFIX);
    for _ in 0..DEVICE_SERIAL_BODY_LEN {
        let idx = rng.random_range(0..SERIAL_ALPHABET.len());
        serial.push(SERIAL_ALPHABET[idx] as char);
    }
    serial
}

/// `L` followed by six decimal digits.
pub fn lens_serial<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{LENS_SERIAL_PREFIX}{:06}", rng.random_range(0..1_000_000u32))
}

/// `round(longitude / 15)` hours, clamped to the real-world range of UTC offsets.
pub fn utc_offset_hours(longitude: f64) -> i32 {
    ((longitude / 15.0).round() as i32).clamp(-12, 14)
}

/// Move `city` by a random distance in `[0, radius_m]` along a random bearing.
fn jitter<R: Rng + ?Sized>(city: &City, radius_m: f64, rng: &mut R) -> GeoPoint {
    // sqrt keeps the points uniform over the disc instead of bunching at the centre
    let distance = radius_m * rng.random::<f64>().sqrt();
    let bearing = rng.random_range(0.0..std::f64::consts::TAU);

    let dlat = distance * bearing.cos() / METRES_PER_DEGREE_LAT;
    let dlon =
        distance * bearing.sin() / (METRES_PER_DEGREE_LAT * city.latitude.to_radians().cos());

    GeoPoint {
        latitude: city.latitude + dlat,
        longitude: city.longitude + dlon,
        altitude: city.altitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // ── serials ──────────────────────────────────────────────────────

    #[test]
    fn device_serial_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let s = device_serial(&mut rng);
            assert_eq!(s.len(), 12);
            assert!(s.starts_with("F2L"));
            assert!(s[3..].bytes().all(|b| SERIAL_ALPHABET.contains(&b)));
            assert!(!s[3..].contains('I') && !s[3..].contains('O'));
        }
    }

    #[test]
    fn lens_serial_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let s = lens_serial(&mut rng);
            assert_eq!(s.len(), 7);
            assert!(s.starts_with('L'));
            assert!(s[1..].bytes().all(|b| b.is_ascii_digit()));
        }
    }

    // ── session slot ─────────────────────────────────────────────────

    #[test]
    fn slot_memoizes_within_a_batch() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut slot = SessionSlot::new(450.0);
        let first = slot.get_or_create("germany", &mut rng).clone();
        let second = slot.get_or_create("germany", &mut rng).clone();
        // A different key does not replace an existing session
        let third = slot.get_or_create("usa", &mut rng).clone();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(first.region.key, "germany");
    }

    #[test]
    fn reset_produces_a_new_identity() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut slot = SessionSlot::new(450.0);
        let first = slot.get_or_create("germany", &mut rng).clone();
        slot.reset();
        assert!(slot.current().is_none());
        let second = slot.get_or_create("germany", &mut rng).clone();
        assert_ne!(first.device_serial, second.device_serial);
    }

    #[test]
    fn same_seed_same_session() {
        let a = Session::create("france", 450.0, &mut StdRng::seed_from_u64(3));
        let b = Session::create("france", 450.0, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    // ── geo jitter ───────────────────────────────────────────────────

    #[test]
    fn geo_center_stays_within_jitter_radius() {
        let mut rng = StdRng::seed_from_u64(99);
        for key in ["usa", "germany", "canada", "australia", "france", "uk"] {
            for _ in 0..100 {
                let s = Session::create(key, 450.0, &mut rng);
                let nearest = s
                    .region
                    .cities
                    .iter()
                    .map(|c| s.geo_center.distance_m(c.latitude, c.longitude))
                    .fold(f64::INFINITY, f64::min);
                assert!(nearest <= 450.0 + 1.0, "{key}: {nearest} m from nearest city");
            }
        }
    }

    #[test]
    fn jitter_radius_is_clamped() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let s = Session::create("usa", 50_000.0, &mut rng);
            let d = s.geo_center.distance_m(s.city.latitude, s.city.longitude);
            assert!(d <= MAX_JITTER_RADIUS_M + 1.0);
        }
    }

    #[test]
    fn unknown_region_uses_default() {
        let s = Session::create("nowhere", 450.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(s.region.key, DEFAULT_REGION);
    }

    // ── timezone ─────────────────────────────────────────────────────

    #[test]
    fn utc_offset_from_longitude() {
        assert_eq!(utc_offset_hours(13.405), 1);
        assert_eq!(utc_offset_hours(-122.4194), -8);
        assert_eq!(utc_offset_hours(151.2093), 10);
        assert_eq!(utc_offset_hours(-0.1278), 0);
        assert_eq!(utc_offset_hours(179.9), 12);
    }
}
