use crate::api;
use crate::config::Config;
use anyhow::{Context, Result, bail};
use glob::glob;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

pub struct Manager {
    work_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(work_dir: P) -> Result<Self> {
        let work_dir = work_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(work_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { work_dir, cfg })
    }

    pub fn ingest_table<P: AsRef<Path>>(&self, table_file: P) -> Result<()> {
        let table_file = table_file.as_ref();
        let text = fs::read_to_string(table_file)
            .with_context(|| format!("failed to read {table_file:?}"))?;

        let ingest = &self.cfg.ingest;
        let response = api::ingest(&text, ingest.id_column.trim(), ingest.agg, ingest.clip_range);
        log::info!("ingested {} series from {table_file:?}", response.series.len());

        write_json(self.raw_series_file(), &response).context("failed to save raw series")?;
        check_response(response.error.as_deref())
    }

    pub fn preprocess_series(&self, request_file: Option<&Path>) -> Result<()> {
        let body: Value = match request_file {
            Some(file) => read_json(file)?,
            None => {
                let raw: SeriesFile = read_json(self.raw_series_file())?;
                Value::Array(raw.series)
            }
        };

        let response = api::preprocess_request(body, self.cfg.preprocess_params());

        write_json(self.processed_series_file(), &response)
            .context("failed to save processed series")?;
        check_response(response.error.as_deref())
    }

    pub fn detect_mutations(&self, request_file: Option<&Path>) -> Result<()> {
        let body: Value = match request_file {
            Some(file) => read_json(file)?,
            None => {
                let processed: ProcessedFile = read_json(self.processed_series_file())?;
                let raw_file = self.raw_series_file();
                let raw_series = if raw_file.exists() {
                    read_json::<SeriesFile, _>(&raw_file)?.series
                } else {
                    Vec::new()
                };
                json!({
                    "processedSeries": processed.processed_series,
                    "rawSeries": raw_series,
                })
            }
        };

        let response = api::detect_request(body, self.cfg.detect_params());

        write_json(self.mutation_points_file(), &response)
            .context("failed to save mutation points")?;
        check_response(response.error.as_deref())
    }

    pub fn run_pipeline<P: AsRef<Path>>(&self, table_file: P) -> Result<()> {
        self.ingest_table(table_file)
            .context("failed to ingest table")?;
        self.preprocess_series(None)
            .context("failed to preprocess series")?;
        self.detect_mutations(None)
            .context("failed to detect mutations")?;
        Ok(())
    }

    pub fn clean_outputs(&self) -> Result<()> {
        for pattern in ["*-series.json", "mutation-points.json"] {
            let pattern = self.work_dir.join(pattern);
            let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
            for file in glob(pattern)
                .context("failed to glob output files")?
                .filter_map(Result::ok)
            {
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    fn raw_series_file(&self) -> PathBuf {
        self.work_dir.join("raw-series.json")
    }

    fn processed_series_file(&self) -> PathBuf {
        self.work_dir.join("processed-series.json")
    }

    fn mutation_points_file(&self) -> PathBuf {
        self.work_dir.join("mutation-points.json")
    }
}

#[derive(Deserialize)]
struct SeriesFile {
    series: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessedFile {
    processed_series: Vec<Value>,
}

fn check_response(error: Option<&str>) -> Result<()> {
    if let Some(error) = error {
        bail!("request failed: {error}");
    }
    Ok(())
}

fn read_json<T: DeserializeOwned, P: AsRef<Path>>(file: P) -> Result<T> {
    let file = file.as_ref();
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {file:?}"))?,
    );
    serde_json::from_reader(reader).with_context(|| format!("failed to parse {file:?}"))
}

fn write_json<T: Serialize, P: AsRef<Path>>(file: P, value: &T) -> Result<()> {
    let file = file.as_ref();
    let mut writer = BufWriter::new(
        File::create(file).with_context(|| format!("failed to create {file:?}"))?,
    );
    serde_json::to_writer_pretty(&mut writer, value).context("failed to serialize response")?;
    writer.flush().context("failed to flush writer stream")?;
    log::info!("wrote {file:?}");
    Ok(())
}
