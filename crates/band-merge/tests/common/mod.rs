//! Fixtures for pipeline tests: a day of synthetic RTMA objects in an
//! in-memory store.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use band_merge::{OutputConfig, RetryPolicy, RunConfig, RunRequest};
use bytes::Bytes;
use chrono::NaiveDate;
use storage::{BlobStore, ObjectStorage};
use test_utils::{create_band_values, Grib2Builder};

pub const WIDTH: usize = 8;
pub const HEIGHT: usize = 6;

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

pub fn hourly_key(hour: u32) -> String {
    format!("rtma2p5.20240301/rtma2p5.t{:02}z.2dvaranl_ndfd.grb2", hour)
}

/// TMP analysis valid at `hour`, values offset by the hour.
pub fn rtma_message(hour: u32) -> Grib2Builder {
    Grib2Builder::new_rtma()
        .with_reference_time(2024, 3, 1, hour as u8, 0)
        .with_data_north_up(create_band_values(WIDTH, HEIGHT, hour as usize))
}

/// Store holding the hourly objects for every hour in `hours`.
pub async fn hourly_store(hours: impl IntoIterator<Item = u32>) -> ObjectStorage {
    let storage = ObjectStorage::in_memory();
    for hour in hours {
        put(&storage, &hourly_key(hour), rtma_message(hour).build()).await;
    }
    storage
}

pub async fn put(storage: &ObjectStorage, key: &str, data: Vec<u8>) {
    storage.put(key, Bytes::from(data)).await.unwrap();
}

pub fn blob_store(storage: ObjectStorage) -> Arc<dyn BlobStore> {
    Arc::new(storage)
}

/// Hourly run for 2024-03-01 writing into `out_dir`, with short retries.
pub fn config(out_dir: &Path) -> RunConfig {
    RunConfig {
        date: Some(date()),
        output: OutputConfig {
            dir: out_dir.to_path_buf(),
            ..Default::default()
        },
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn request(config: &RunConfig) -> RunRequest {
    config.request().unwrap()
}

/// Names of the files in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
