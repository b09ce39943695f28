//! Deterministic sample generators.
//!
//! All generators return row-major, north-up data (row 0 first).

/// Creates a test grid with predictable values.
///
/// Each cell value is `col * 1000 + row`, so a misplaced sample is easy to
/// spot by looking at its value.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Temperature-like values in Kelvin, 250K top-left to about 310K
/// bottom-right.
pub fn create_temperature_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            data.push(250.0 + (x_factor * 30.0) + (y_factor * 30.0));
        }
    }
    data
}

/// Values for the `band`-th hourly field of a merge test.
///
/// Every band differs from its neighbours by a whole degree so that a
/// band written into the wrong slot fails comparison at any tolerance.
pub fn create_band_values(width: usize, height: usize, band: usize) -> Vec<f32> {
    create_temperature_grid(width, height)
        .into_iter()
        .map(|v| v + band as f32)
        .collect()
}

/// Zeros with NaN at the given `(col, row)` positions.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![0.0f32; width * height];
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}
