//! Synthetic GRIB2 message builder.
//!
//! Produces structurally valid edition 2 messages with simple packing
//! (template 5.0), a lat/lon (3.0) or Lambert conformal (3.30) grid, and an
//! optional bitmap for NaN samples. Signed fields are written in GRIB2
//! sign-and-magnitude form.

/// Grid template written to Section 3.
#[derive(Debug, Clone, PartialEq)]
pub enum GridTemplate {
    /// Degrees; longitudes may be in either [-180, 180] or [0, 360].
    LatLon {
        la1: f64,
        lo1: f64,
        la2: f64,
        lo2: f64,
        di: f64,
        dj: f64,
    },
    /// Degrees for angles, metres for increments.
    Lambert {
        la1: f64,
        lo1: f64,
        lad: f64,
        lov: f64,
        dx: f64,
        dy: f64,
        latin1: f64,
        latin2: f64,
    },
}

/// Build a GRIB2 message with the specified parameters
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    earth_shape: u8,
    ni: u32,
    nj: u32,
    template: GridTemplate,
    scanning_mode: u8,
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: u32,
    time_unit: u8,
    forecast_time: u32,
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 10x10 one-degree lat/lon grid over the western US, TMP at 2 m.
    pub fn new_latlon() -> Self {
        let (ni, nj) = (10, 10);
        Self {
            discipline: 0,
            center: 7,
            year: 2024,
            month: 3,
            day: 1,
            hour: 0,
            minute: 0,
            earth_shape: 6,
            ni,
            nj,
            template: GridTemplate::LatLon {
                la1: 45.0,
                lo1: 230.0,
                la2: 36.0,
                lo2: 239.0,
                di: 1.0,
                dj: 1.0,
            },
            scanning_mode: 0b0000_0000, // +i, -j
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_value: 2,
            time_unit: 1,
            forecast_time: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    /// Small RTMA-like Lambert conformal grid (2.5 km, scanning north).
    pub fn new_rtma() -> Self {
        let (ni, nj) = (8, 6);
        Self {
            discipline: 0,
            center: 7,
            year: 2024,
            month: 3,
            day: 1,
            hour: 0,
            minute: 0,
            earth_shape: 6,
            ni,
            nj,
            template: GridTemplate::Lambert {
                la1: 19.229,
                lo1: 233.723_448,
                lad: 25.0,
                lov: 265.0,
                dx: 2539.703,
                dy: 2539.703,
                latin1: 25.0,
                latin2: 25.0,
            },
            scanning_mode: 0b0100_0000, // +i, +j, i consecutive
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_value: 2,
            time_unit: 1,
            forecast_time: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self.minute = minute;
        self
    }

    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self
    }

    pub fn with_template(mut self, template: GridTemplate) -> Self {
        self.template = template;
        self
    }

    /// Move the first grid point, keeping every other grid parameter.
    pub fn with_first_point(mut self, lat: f64, lon: f64) -> Self {
        match &mut self.template {
            GridTemplate::LatLon { la1, lo1, .. } | GridTemplate::Lambert { la1, lo1, .. } => {
                *la1 = lat;
                *lo1 = lon;
            }
        }
        self
    }

    pub fn with_earth_shape(mut self, code: u8) -> Self {
        self.earth_shape = code;
        self
    }

    pub fn with_scanning_mode(mut self, flag: u8) -> Self {
        self.scanning_mode = flag;
        self
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    /// Forecast offset in the given Code Table 4.4 unit.
    pub fn with_forecast(mut self, unit: u8, value: u32) -> Self {
        self.time_unit = unit;
        self.forecast_time = value;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in the message's scan order. NaN entries become bitmap holes.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Values given north-up row-major, reordered into the scan order
    /// declared by the scanning mode (i consecutive, non-alternating).
    pub fn with_data_north_up(mut self, data: Vec<f32>) -> Self {
        let (nx, ny) = (self.ni as usize, self.nj as usize);
        let i_negative = self.scanning_mode & 0x80 != 0;
        let j_positive = self.scanning_mode & 0x40 != 0;
        let mut scan = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let col = if i_negative { nx - 1 - i } else { i };
                let row = if j_positive { ny - 1 - j } else { j };
                scan.push(data[row * nx + col]);
            }
        }
        self.data_values = scan;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];
        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        for s in &sections {
            message.extend_from_slice(s);
        }
        message.extend_from_slice(b"7777");
        message
    }

    fn present(&self) -> impl Iterator<Item = f32> + '_ {
        self.data_values.iter().copied().filter(|v| !v.is_nan())
    }

    fn has_missing(&self) -> bool {
        self.data_values.iter().any(|v| v.is_nan())
    }

    /// (reference, binary scale, bits) for 16-bit simple packing.
    fn packing(&self) -> (f32, i16, u8) {
        let (min_val, max_val) = self
            .present()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !min_val.is_finite() {
            return (0.0, 0, 0);
        }
        let range = max_val - min_val;
        if range == 0.0 {
            return (min_val, 0, 0);
        }
        let e = (range as f64 / 65535.0).log2().ceil() as i16;
        (min_val, e, 16)
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut s = Vec::new();
        s.extend_from_slice(&21u32.to_be_bytes());
        s.push(1);
        s.extend_from_slice(&self.center.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes()); // sub-center
        s.push(2); // master table version
        s.push(1); // local table version
        s.push(0); // significance: analysis
        s.extend_from_slice(&self.year.to_be_bytes());
        s.push(self.month);
        s.push(self.day);
        s.push(self.hour);
        s.push(self.minute);
        s.push(0);
        s.push(0); // operational
        s.push(0); // analysis
        s
    }

    fn earth_header(&self, s: &mut Vec<u8>) {
        s.push(self.earth_shape);
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
    }

    fn build_section3(&self) -> Vec<u8> {
        let (template_num, template_len): (u16, u32) = match self.template {
            GridTemplate::LatLon { .. } => (0, 58),
            GridTemplate::Lambert { .. } => (30, 67),
        };

        let mut s = Vec::new();
        s.extend_from_slice(&(14 + template_len).to_be_bytes());
        s.push(3);
        s.push(0); // source of grid definition
        s.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        s.push(0);
        s.push(0);
        s.extend_from_slice(&template_num.to_be_bytes());

        self.earth_header(&mut s);
        s.extend_from_slice(&self.ni.to_be_bytes());
        s.extend_from_slice(&self.nj.to_be_bytes());

        match self.template {
            GridTemplate::LatLon {
                la1,
                lo1,
                la2,
                lo2,
                di,
                dj,
            } => {
                s.extend_from_slice(&0u32.to_be_bytes()); // basic angle
                s.extend_from_slice(&u32::MAX.to_be_bytes()); // subdivisions
                s.extend_from_slice(&micro(la1));
                s.extend_from_slice(&micro(lo1));
                s.push(48);
                s.extend_from_slice(&micro(la2));
                s.extend_from_slice(&micro(lo2));
                s.extend_from_slice(&((di * 1e6).round() as u32).to_be_bytes());
                s.extend_from_slice(&((dj * 1e6).round() as u32).to_be_bytes());
                s.push(self.scanning_mode);
            }
            GridTemplate::Lambert {
                la1,
                lo1,
                lad,
                lov,
                dx,
                dy,
                latin1,
                latin2,
            } => {
                s.extend_from_slice(&micro(la1));
                s.extend_from_slice(&micro(lo1));
                s.push(8); // resolution and component flags
                s.extend_from_slice(&micro(lad));
                s.extend_from_slice(&micro(lov));
                s.extend_from_slice(&((dx * 1e3).round() as u32).to_be_bytes());
                s.extend_from_slice(&((dy * 1e3).round() as u32).to_be_bytes());
                s.push(0); // projection centre: north pole
                s.push(self.scanning_mode);
                s.extend_from_slice(&micro(latin1));
                s.extend_from_slice(&micro(latin2));
                s.extend_from_slice(&micro(-90.0));
                s.extend_from_slice(&micro(0.0));
            }
        }
        s
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut s = Vec::new();
        s.extend_from_slice(&34u32.to_be_bytes());
        s.push(4);
        s.extend_from_slice(&0u16.to_be_bytes()); // coordinate values
        s.extend_from_slice(&0u16.to_be_bytes()); // template 4.0
        s.push(self.param_category);
        s.push(self.param_number);
        s.push(0); // generating process: analysis
        s.push(0);
        s.push(0);
        s.extend_from_slice(&0u16.to_be_bytes());
        s.push(0);
        s.push(self.time_unit);
        s.extend_from_slice(&self.forecast_time.to_be_bytes());
        s.push(self.level_type);
        s.push(0);
        s.extend_from_slice(&self.level_value.to_be_bytes());
        s.push(255);
        s.push(0);
        s.extend_from_slice(&0u32.to_be_bytes());
        s
    }

    fn build_section5(&self) -> Vec<u8> {
        let (reference, e, bits) = self.packing();
        let packed_points = self.present().count() as u32;

        let mut s = Vec::new();
        s.extend_from_slice(&21u32.to_be_bytes());
        s.push(5);
        s.extend_from_slice(&packed_points.to_be_bytes());
        s.extend_from_slice(&0u16.to_be_bytes()); // template 5.0
        s.extend_from_slice(&reference.to_be_bytes());
        s.extend_from_slice(&sign_magnitude_i16(e));
        s.extend_from_slice(&0u16.to_be_bytes()); // decimal scale
        s.push(bits);
        s.push(0); // floating point
        s
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut s = Vec::new();
        if !self.has_missing() {
            s.extend_from_slice(&6u32.to_be_bytes());
            s.push(6);
            s.push(255);
            return s;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, v) in self.data_values.iter().enumerate() {
            if !v.is_nan() {
                bitmap[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        s.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        s.push(6);
        s.push(0);
        s.extend_from_slice(&bitmap);
        s
    }

    fn build_section7(&self) -> Vec<u8> {
        let (reference, e, bits) = self.packing();
        let mut packed = Vec::new();
        if bits > 0 {
            let scale = 2f64.powi(e as i32);
            for v in self.present() {
                let x = ((v as f64 - reference as f64) / scale).round() as u16;
                packed.extend_from_slice(&x.to_be_bytes());
            }
        }

        let mut s = Vec::new();
        s.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        s.push(7);
        s.extend_from_slice(&packed);
        s
    }
}

/// Concatenate messages into one multi-message file.
pub fn concat_messages(messages: &[Vec<u8>]) -> Vec<u8> {
    messages.concat()
}

fn micro(deg: f64) -> [u8; 4] {
    sign_magnitude_i32((deg * 1e6).round() as i32)
}

fn sign_magnitude_i32(v: i32) -> [u8; 4] {
    let raw = if v < 0 {
        0x8000_0000 | v.unsigned_abs()
    } else {
        v as u32
    };
    raw.to_be_bytes()
}

fn sign_magnitude_i16(v: i16) -> [u8; 2] {
    let raw = if v < 0 {
        0x8000 | v.unsigned_abs()
    } else {
        v as u16
    };
    raw.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_framing() {
        let msg = Grib2Builder::new_rtma().with_gradient(270.0, 300.0).build();
        assert_eq!(&msg[0..4], b"GRIB");
        assert_eq!(msg[7], 2);
        let len = u64::from_be_bytes(msg[8..16].try_into().unwrap());
        assert_eq!(len as usize, msg.len());
        assert_eq!(&msg[msg.len() - 4..], b"7777");
    }

    #[test]
    fn test_lambert_section_length() {
        let msg = Grib2Builder::new_rtma().build();
        // Section 1 is 21 bytes, Section 3 follows
        let s3 = &msg[16 + 21..];
        assert_eq!(u32::from_be_bytes(s3[0..4].try_into().unwrap()), 81);
        assert_eq!(s3[4], 3);
    }

    #[test]
    fn test_negative_values_are_sign_magnitude() {
        assert_eq!(sign_magnitude_i32(-1), [0x80, 0, 0, 1]);
        assert_eq!(sign_magnitude_i16(-3), [0x80, 3]);
        assert_eq!(sign_magnitude_i16(3), [0, 3]);
    }

    #[test]
    fn test_nan_produces_bitmap() {
        let mut data = vec![1.0f32; 100];
        data[5] = f32::NAN;
        let plain = Grib2Builder::new_latlon().with_constant_value(1.0).build();
        let holed = Grib2Builder::new_latlon().with_data(data).build();
        // 13 bytes of bitmap added, one packed value fewer at 0 bits each
        assert_eq!(holed.len(), plain.len() + 13);
    }

    #[test]
    fn test_north_up_reordering() {
        let b = Grib2Builder::new_rtma()
            .with_grid(2, 2)
            .with_data_north_up(vec![1.0, 2.0, 3.0, 4.0]);
        // Scanning north: the bottom row comes first
        assert_eq!(b.data_values, vec![3.0, 4.0, 1.0, 2.0]);
    }
}
