//! Japanese plane rectangular coordinate systems (平面直角座標系) back to
//! geographic longitude/latitude on the GRS80 ellipsoid.
//!
//! Zoning datasets exported from municipal GIS are often in one of the 19
//! JGD2000 / JGD2011 plane zones. The inverse transverse Mercator here uses
//! the Krüger n-series published by the Geospatial Information Authority,
//! accurate to well under a millimetre inside a zone.

use geo::Coord;

const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const INVERSE_FLATTENING: f64 = 298.257_222_101;
const SCALE_FACTOR: f64 = 0.9999;

/// Origins of zones I..XIX as (latitude, longitude) in degrees.
const ZONE_ORIGINS: [(f64, f64); 19] = [
    (33.0, 129.5),
    (33.0, 131.0),
    (36.0, 132.0 + 10.0 / 60.0),
    (33.0, 133.5),
    (36.0, 134.0 + 20.0 / 60.0),
    (36.0, 136.0),
    (36.0, 137.0 + 10.0 / 60.0),
    (36.0, 138.5),
    (36.0, 139.0 + 50.0 / 60.0),
    (40.0, 140.0 + 50.0 / 60.0),
    (44.0, 140.25),
    (44.0, 142.25),
    (44.0, 144.25),
    (26.0, 142.0),
    (26.0, 127.5),
    (26.0, 124.0),
    (26.0, 131.0),
    (20.0, 136.0),
    (26.0, 154.0),
];

/// EPSG codes of zone I in each datum; the other zones follow consecutively.
const JGD2000_ZONE_ONE: u32 = 2443;
const JGD2011_ZONE_ONE: u32 = 6669;

/// One plane rectangular zone, ready to convert easting/northing metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneRectangular {
    zone: u8,
    origin_longitude: f64,
    /// Scaled meridian arc from the equator to the origin latitude.
    origin_arc: f64,
}

impl PlaneRectangular {
    /// Zone number 1..=19.
    pub fn zone(zone: u8) -> Option<Self> {
        let (lat, lon) = *ZONE_ORIGINS.get(usize::from(zone).checked_sub(1)?)?;
        Some(Self {
            zone,
            origin_longitude: lon,
            origin_arc: meridian_arc(lat.to_radians()),
        })
    }

    /// Resolves JGD2000 (EPSG:2443-2461) and JGD2011 (EPSG:6669-6687) codes.
    pub fn from_epsg(code: u32) -> Option<Self> {
        [JGD2000_ZONE_ONE, JGD2011_ZONE_ONE]
            .into_iter()
            .filter_map(|first| code.checked_sub(first))
            .find(|offset| *offset < 19)
            .and_then(|offset| u8::try_from(offset + 1).ok())
            .and_then(Self::zone)
    }

    pub fn number(&self) -> u8 {
        self.zone
    }

    /// `x` is easting and `y` northing in metres, as GIS exports write them.
    /// Returns `x = longitude`, `y = latitude` in degrees.
    pub fn to_geographic(&self, plane: Coord<f64>) -> Coord<f64> {
        let n = third_flattening();
        let rectifying = rectifying_radius(n);
        let xi = (plane.y + self.origin_arc) / rectifying;
        let eta = plane.x / rectifying;

        let beta = beta_coefficients(n);
        let (mut xi_prime, mut eta_prime) = (xi, eta);
        for (j, b) in beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_prime -= b * (k * xi).sin() * (k * eta).cosh();
            eta_prime -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_prime.sin() / eta_prime.cosh()).asin();
        let latitude = delta_coefficients(n)
            .iter()
            .enumerate()
            .fold(chi, |acc, (j, d)| acc + d * (2.0 * (j + 1) as f64 * chi).sin());
        let longitude =
            self.origin_longitude.to_radians() + (eta_prime.sinh() / xi_prime.cos()).atan();

        Coord {
            x: longitude.to_degrees(),
            y: latitude.to_degrees(),
        }
    }
}

fn third_flattening() -> f64 {
    let f = 1.0 / INVERSE_FLATTENING;
    f / (2.0 - f)
}

fn rectifying_radius(n: f64) -> f64 {
    SCALE_FACTOR * SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0)
}

fn meridian_arc(latitude: f64) -> f64 {
    let n = third_flattening();
    let a = [
        1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0,
        -1.5 * (n - n.powi(3) / 8.0 - n.powi(5) / 64.0),
        15.0 / 16.0 * (n.powi(2) - n.powi(4) / 4.0),
        -35.0 / 48.0 * (n.powi(3) - 5.0 / 16.0 * n.powi(5)),
        315.0 / 512.0 * n.powi(4),
        -693.0 / 1280.0 * n.powi(5),
    ];
    let series = a[1..]
        .iter()
        .enumerate()
        .fold(a[0] * latitude, |acc, (j, aj)| {
            acc + aj * (2.0 * (j + 1) as f64 * latitude).sin()
        });
    SCALE_FACTOR * SEMI_MAJOR_AXIS / (1.0 + n) * series
}

fn beta_coefficients(n: f64) -> [f64; 5] {
    [
        n / 2.0 - 2.0 / 3.0 * n.powi(2) + 37.0 / 96.0 * n.powi(3) - n.powi(4) / 360.0
            - 81.0 / 512.0 * n.powi(5),
        n.powi(2) / 48.0 + n.powi(3) / 15.0 - 437.0 / 1440.0 * n.powi(4)
            + 46.0 / 105.0 * n.powi(5),
        17.0 / 480.0 * n.powi(3) - 37.0 / 840.0 * n.powi(4) - 209.0 / 4480.0 * n.powi(5),
        4397.0 / 161_280.0 * n.powi(4) - 11.0 / 504.0 * n.powi(5),
        4583.0 / 161_280.0 * n.powi(5),
    ]
}

fn delta_coefficients(n: f64) -> [f64; 6] {
    [
        2.0 * n - 2.0 / 3.0 * n.powi(2) - 2.0 * n.powi(3) + 116.0 / 45.0 * n.powi(4)
            + 26.0 / 45.0 * n.powi(5)
            - 2854.0 / 675.0 * n.powi(6),
        7.0 / 3.0 * n.powi(2) - 8.0 / 5.0 * n.powi(3) - 227.0 / 45.0 * n.powi(4)
            + 2704.0 / 315.0 * n.powi(5)
            + 2323.0 / 945.0 * n.powi(6),
        56.0 / 15.0 * n.powi(3) - 136.0 / 35.0 * n.powi(4) - 1262.0 / 105.0 * n.powi(5)
            + 73_814.0 / 2835.0 * n.powi(6),
        4279.0 / 630.0 * n.powi(4) - 332.0 / 35.0 * n.powi(5)
            - 399_572.0 / 14_175.0 * n.powi(6),
        4174.0 / 315.0 * n.powi(5) - 144_838.0 / 6237.0 * n.powi(6),
        601_676.0 / 22_275.0 * n.powi(6),
    ]
}
