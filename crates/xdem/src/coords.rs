//! Tile coordinates and the hemisphere-letter naming used throughout the cache.

use std::fmt;

/// Integer origin of a one-degree tile: the south-west corner.
///
/// A tile with origin `(47, -123)` covers latitudes 47..48 and longitudes
/// -123..-122. Raster frames are expressed as offsets from this corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileOrigin {
    /// Latitude of the southern edge.
    pub lat: i32,
    /// Longitude of the western edge.
    pub lon: i32,
}

impl TileOrigin {
    /// Create a tile origin.
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Tile containing a geographic coordinate.
    pub fn containing(lat: f64, lon: f64) -> Self {
        Self {
            lat: lat.floor() as i32,
            lon: lon.floor() as i32,
        }
    }

    /// Neighbor tile, wrapping longitude across the antimeridian.
    pub fn offset(&self, dlat: i32, dlon: i32) -> Self {
        Self {
            lat: self.lat + dlat,
            lon: wrap_lon(self.lon + dlon),
        }
    }

    /// Hemisphere token such as `N47W123`.
    pub fn hem_token(&self) -> String {
        hem_latlon(self.lat, self.lon)
    }

    /// Ten-degree bucket directory such as `+40-130`.
    pub fn bucket_dir(&self) -> String {
        round_latlon(self.lat, self.lon)
    }

    /// Convert absolute degrees into offsets relative to this origin.
    pub fn to_offset(&self, lon: f64, lat: f64) -> (f64, f64) {
        (lon - self.lon as f64, lat - self.lat as f64)
    }
}

impl fmt::Display for TileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hem_token())
    }
}

/// Normalize a whole-degree longitude into `-180..180`.
pub fn wrap_lon(lon: i32) -> i32 {
    (lon + 180).rem_euclid(360) - 180
}

/// Hemisphere letters plus zero padded degrees, e.g. `S42E174`.
pub fn hem_latlon(lat: i32, lon: i32) -> String {
    format!(
        "{}{:02}{}{:03}",
        if lat >= 0 { 'N' } else { 'S' },
        lat.abs(),
        if lon >= 0 { 'E' } else { 'W' },
        lon.abs()
    )
}

/// Signed ten-degree bucket of a tile, e.g. `+40-130` or `-50+170`.
pub fn round_latlon(lat: i32, lon: i32) -> String {
    format!(
        "{:+03}{:+04}",
        10 * lat.div_euclid(10),
        10 * lon.div_euclid(10)
    )
}

/// Parse a file name that starts with a hemisphere token like `N45E007.hgt`.
///
/// Returns the tile origin it names, or `None` if the name does not follow the
/// convention.
pub fn parse_hem_filename(filename: &str) -> Option<TileOrigin> {
    let bytes = filename.as_bytes();
    if bytes.len() < 7 {
        return None;
    }
    let lat_sign = match bytes[0].to_ascii_uppercase() {
        b'N' => 1,
        b'S' => -1,
        _ => return None,
    };
    let lon_sign = match bytes[3].to_ascii_uppercase() {
        b'E' => 1,
        b'W' => -1,
        _ => return None,
    };
    let lat: i32 = filename.get(1..3)?.parse().ok()?;
    let lon: i32 = filename.get(4..7)?.parse().ok()?;
    Some(TileOrigin::new(lat_sign * lat, lon_sign * lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hem_latlon() {
        assert_eq!(hem_latlon(47, -123), "N47W123");
        assert_eq!(hem_latlon(-42, 174), "S42E174");
        assert_eq!(hem_latlon(0, 0), "N00E000");
        assert_eq!(hem_latlon(-1, -1), "S01W001");
    }

    #[test]
    fn test_round_latlon() {
        assert_eq!(round_latlon(47, -123), "+40-130");
        assert_eq!(round_latlon(-42, 174), "-50+170");
        assert_eq!(round_latlon(5, 7), "+00+000");
    }

    #[test]
    fn test_containing() {
        assert_eq!(TileOrigin::containing(47.6062, -122.3321), TileOrigin::new(47, -123));
        assert_eq!(TileOrigin::containing(-0.5, 0.5), TileOrigin::new(-1, 0));
    }

    #[test]
    fn test_offset_wraps_antimeridian() {
        let tile = TileOrigin::new(10, 179);
        assert_eq!(tile.offset(0, 1), TileOrigin::new(10, -180));
        assert_eq!(TileOrigin::new(10, -180).offset(-1, -1), TileOrigin::new(9, 179));
    }

    #[test]
    fn test_parse_hem_filename() {
        assert_eq!(parse_hem_filename("N45E007.hgt"), Some(TileOrigin::new(45, 7)));
        assert_eq!(parse_hem_filename("s42e174.hgt"), Some(TileOrigin::new(-42, 174)));
        assert_eq!(parse_hem_filename("N47W123.hgt"), Some(TileOrigin::new(47, -123)));
        assert!(parse_hem_filename("readme.txt").is_none());
        assert!(parse_hem_filename("N4").is_none());
    }
}
