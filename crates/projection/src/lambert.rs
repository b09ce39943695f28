//! Lambert Conformal Conic projection.
//!
//! Used by CONUS analysis grids such as RTMA and HRRR. GRIB2 template 3.30
//! gives the first grid point in lat/lon; projecting it yields the grid
//! origin in metres, from which the geotransform follows.
//!
//! The projection parameters include:
//! - Latitude of origin (lat0), usually LaD from the GRIB2 template
//! - Central meridian (lon0), LoV in GRIB2
//! - Standard parallel(s): Latin1 and Latin2 (equal for a tangent cone)

use std::f64::consts::PI;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid projection parameter: {0}")]
    InvalidParameter(String),
}

/// Lambert Conformal Conic on a sphere.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Latitude of origin in degrees
    pub lat0_deg: f64,
    /// Central meridian in degrees
    pub lon0_deg: f64,
    /// First standard parallel in degrees
    pub latin1_deg: f64,
    /// Second standard parallel in degrees
    pub latin2_deg: f64,
    /// Sphere radius (meters)
    pub earth_radius: f64,
    lon0: f64,
    /// Cone constant
    n: f64,
    /// F constant
    f: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    pub fn new(
        lat0_deg: f64,
        lon0_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        earth_radius: f64,
    ) -> Result<Self, ProjectionError> {
        let to_rad = PI / 180.0;
        let latin1 = latin1_deg * to_rad;
        let latin2 = latin2_deg * to_rad;
        let lat0 = lat0_deg * to_rad;

        if !(earth_radius > 0.0) {
            return Err(ProjectionError::InvalidParameter(format!(
                "earth radius {}",
                earth_radius
            )));
        }
        if latin1.cos().abs() < 1e-12 || latin2.cos().abs() < 1e-12 {
            return Err(ProjectionError::InvalidParameter(
                "standard parallel at a pole".to_string(),
            ));
        }

        let n = if (latin1 - latin2).abs() < 1e-10 {
            // Tangent cone (single standard parallel)
            latin1.sin()
        } else {
            // Secant cone (two standard parallels)
            let ln_ratio = (latin1.cos() / latin2.cos()).ln();
            let tan_ratio =
                ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };

        if n.abs() < 1e-12 || !n.is_finite() {
            return Err(ProjectionError::InvalidParameter(format!(
                "degenerate cone constant {} for parallels {} / {}",
                n, latin1_deg, latin2_deg
            )));
        }

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = earth_radius * f / (PI / 4.0 + lat0 / 2.0).tan().powf(n);

        Ok(Self {
            lat0_deg,
            lon0_deg,
            latin1_deg,
            latin2_deg,
            earth_radius,
            lon0: lon0_deg * to_rad,
            n,
            f,
            rho0,
        })
    }

    /// Geographic (degrees) to projected coordinates (meters).
    pub fn project(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let dlon = normalize_angle(lon_deg * to_rad - self.lon0);

        let rho = self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;

        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }

    /// Projected coordinates (meters) to geographic (degrees), as `(lat, lon)`.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let dy = self.rho0 - y;

        let mut rho = (x * x + dy * dy).sqrt();
        let theta = if self.n < 0.0 {
            rho = -rho;
            (-x).atan2(-dy)
        } else {
            x.atan2(dy)
        };

        let lat = 2.0 * (self.earth_radius * self.f / rho).powf(1.0 / self.n).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;

        (lat * to_deg, normalize_angle(lon) * to_deg)
    }
}

/// Wrap an angle to [-π, π].
fn normalize_angle(mut a: f64) -> f64 {
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}
