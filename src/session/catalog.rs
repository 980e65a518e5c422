/// A photographing device the batch pretends to come from.
///
/// All optical values describe the main (wide) camera module, which is the one a
/// phone uses for a default full-resolution shot.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub make: &'static str,
    pub model: &'static str,
    /// Firmware / OS version written to the `Software` tag.
    pub firmware: &'static str,
    /// Native sensor output in pixels (width, height).
    pub sensor_resolution: (u32, u32),
    pub megapixels: f32,
    pub lens_make: &'static str,
    pub lens_model: &'static str,
    /// Shortest and longest focal length across all modules, in mm.
    pub focal_range: (f64, f64),
    /// Widest and narrowest aperture across all modules.
    pub aperture_range: (f64, f64),
    /// Physical focal length of the main module, in mm.
    pub focal_length: f64,
    pub focal_length_35mm: u16,
    pub aperture: f64,
    /// Horizontal field of view in degrees.
    pub field_of_view: f64,
}

pub const DEVICES: &[DeviceProfile] = &[
    DeviceProfile {
        make: "Apple",
        model: "iPhone 14 Pro Max",
        firmware: "17.6.1",
        sensor_resolution: (4032, 3024),
        megapixels: 48.0,
        lens_make: "Apple",
        lens_model: "iPhone 14 Pro Max back triple camera 6.86mm f/1.78",
        focal_range: (2.22, 9.0),
        aperture_range: (1.78, 2.8),
        focal_length: 6.86,
        focal_length_35mm: 24,
        aperture: 1.78,
        field_of_view: 73.7,
    },
    DeviceProfile {
        make: "Apple",
        model: "iPhone 15 Pro",
        firmware: "17.6.1",
        sensor_resolution: (4032, 3024),
        megapixels: 48.0,
        lens_make: "Apple",
        lens_model: "iPhone 15 Pro back triple camera 6.765mm f/1.78",
        focal_range: (2.22, 9.0),
        aperture_range: (1.78, 2.8),
        focal_length: 6.765,
        focal_length_35mm: 24,
        aperture: 1.78,
        field_of_view: 73.7,
    },
    DeviceProfile {
        make: "Apple",
        model: "iPhone 16 Pro Max",
        firmware: "18.0",
        sensor_resolution: (5712, 4284),
        megapixels: 48.0,
        lens_make: "Apple",
        lens_model: "iPhone 16 Pro Max back triple camera 6.765mm f/1.78",
        focal_range: (2.22, 15.66),
        aperture_range: (1.78, 2.8),
        focal_length: 6.765,
        focal_length_35mm: 24,
        aperture: 1.78,
        field_of_view: 73.7,
    },
];

/// A candidate shooting spot inside a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level.
    pub altitude: f64,
}

/// A named region with several candidate cities.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub key: &'static str,
    pub country: &'static str,
    pub cities: &'static [City],
}

pub const DEFAULT_REGION: &str = "usa";

pub const REGIONS: &[Region] = &[
    Region {
        key: "usa",
        country: "United States",
        cities: &[
            City { name: "San Francisco", latitude: 37.7749, longitude: -122.4194, altitude: 16.0 },
            City { name: "Los Angeles", latitude: 34.0522, longitude: -118.2437, altitude: 93.0 },
            City { name: "New York", latitude: 40.7128, longitude: -74.0060, altitude: 10.0 },
            City { name: "Chicago", latitude: 41.8781, longitude: -87.6298, altitude: 181.0 },
            City { name: "Austin", latitude: 30.2672, longitude: -97.7431, altitude: 149.0 },
        ],
    },
    Region {
        key: "germany",
        country: "Germany",
        cities: &[
            City { name: "Berlin", latitude: 52.5200, longitude: 13.4050, altitude: 34.0 },
            City { name: "Munich", latitude: 48.1351, longitude: 11.5820, altitude: 519.0 },
            City { name: "Hamburg", latitude: 53.5511, longitude: 9.9937, altitude: 6.0 },
            City { name: "Frankfurt", latitude: 50.1109, longitude: 8.6821, altitude: 112.0 },
            City { name: "Cologne", latitude: 50.9375, longitude: 6.9603, altitude: 53.0 },
        ],
    },
    Region {
        key: "canada",
        country: "Canada",
        cities: &[
            City { name: "Toronto", latitude: 43.6532, longitude: -79.3832, altitude: 76.0 },
            City { name: "Vancouver", latitude: 49.2827, longitude: -123.1207, altitude: 70.0 },
            City { name: "Montreal", latitude: 45.5017, longitude: -73.5673, altitude: 36.0 },
            City { name: "Calgary", latitude: 51.0447, longitude: -114.0719, altitude: 1045.0 },
        ],
    },
    Region {
        key: "australia",
        country: "Australia",
        cities: &[
            City { name: "Sydney", latitude: -33.8688, longitude: 151.2093, altitude: 58.0 },
            City { name: "Melbourne", latitude: -37.8136, longitude: 144.9631, altitude: 31.0 },
            City { name: "Brisbane", latitude: -27.4698, longitude: 153.0251, altitude: 28.0 },
            City { name: "Perth", latitude: -31.9505, longitude: 115.8605, altitude: 20.0 },
        ],
    },
    Region {
        key: "france",
        country: "France",
        cities: &[
            City { name: "Paris", latitude: 48.8566, longitude: 2.3522, altitude: 35.0 },
            City { name: "Lyon", latitude: 45.7640, longitude: 4.8357, altitude: 173.0 },
            City { name: "Marseille", latitude: 43.2965, longitude: 5.3698, altitude: 12.0 },
            City { name: "Toulouse", latitude: 43.6047, longitude: 1.4442, altitude: 146.0 },
        ],
    },
    Region {
        key: "uk",
        country: "United Kingdom",
        cities: &[
            City { name: "London", latitude: 51.5074, longitude: -0.1278, altitude: 11.0 },
            City { name: "Manchester", latitude: 53.4808, longitude: -2.2426, altitude: 38.0 },
            City { name: "Edinburgh", latitude: 55.9533, longitude: -3.1883, altitude: 47.0 },
        ],
    },
];

/// Look up a region by key (case-insensitive, surrounding whitespace ignored).
///
/// Unknown keys resolve to [`DEFAULT_REGION`], so this never fails.
pub fn region(key: &str) -> &'static Region {
    let key = key.trim().to_lowercase();
    REGIONS
        .iter()
        .find(|r| r.key == key)
        .or_else(|| REGIONS.iter().find(|r| r.key == DEFAULT_REGION))
        .unwrap_or(&REGIONS[0])
}

/// Whether a region key is known to the catalog.
pub fn is_known_region(key: &str) -> bool {
    let key = key.trim().to_lowercase();
    REGIONS.iter().any(|r| r.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_lookup_is_case_insensitive() {
        assert_eq!(region("Germany").key, "germany");
        assert_eq!(region("  FRANCE ").key, "france");
    }

    #[test]
    fn unknown_region_falls_back_to_default() {
        assert_eq!(region("atlantis").key, DEFAULT_REGION);
        assert_eq!(region("").key, DEFAULT_REGION);
        assert!(!is_known_region("atlantis"));
    }

    #[test]
    fn every_region_has_several_cities() {
        for r in REGIONS {
            assert!(r.cities.len() >= 3, "{} has too few cities", r.key);
        }
    }

    #[test]
    fn device_optics_are_consistent() {
        for d in DEVICES {
            assert_eq!(d.make, "Apple");
            assert!(d.focal_range.0 <= d.focal_length && d.focal_length <= d.focal_range.1);
            assert!(d.aperture_range.0 <= d.aperture && d.aperture <= d.aperture_range.1);
            assert!(d.lens_model.starts_with(d.model));
        }
    }
}
