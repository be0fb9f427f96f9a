//! CSV loader and writer for the four panel files.
//!
//! File layouts (columns are addressed by position, so headers written by
//! other tools are accepted):
//! - prices: date, then one column per asset; empty cell = missing price
//! - features: date, asset, then one column per feature; no empty cells
//! - labels: date, asset, target_return
//! - predictions: date, asset, predicted_return
//!
//! Dates are ISO-8601 (`YYYY-MM-DD`); a trailing time component is ignored.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PipelineError;

use super::types::{FeaturePanel, PanelKey, PricePanel, ScalarPanel};

pub const DATE_COLUMN: &str = "date";
pub const ASSET_COLUMN: &str = "asset";

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Panel(#[from] PipelineError),
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Reads and writes panel CSV files.
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    clean_prices: bool,
}

impl DataLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward-fill prices and drop incomplete dates on load.
    pub fn with_price_cleaning(mut self, clean: bool) -> Self {
        self.clean_prices = clean;
        self
    }

    /// Load a wide price file as written. Cleaning is not applied here.
    pub fn load_prices(&self, path: impl AsRef<Path>) -> LoaderResult<PricePanel> {
        let df = read_csv(path.as_ref())?;
        let columns = df.get_columns();

        if columns.len() < 2 {
            return Err(LoaderError::InvalidData(format!(
                "price file needs a date column and at least one asset column, found {} columns",
                columns.len()
            )));
        }

        let dates = date_column(&columns[0])?;
        let assets: Vec<String> = columns[1..]
            .iter()
            .map(|c| c.name().as_str().to_string())
            .collect();
        let prices = columns[1..]
            .iter()
            .map(float_column)
            .collect::<LoaderResult<Vec<_>>>()?;

        let panel = PricePanel::new(dates, assets, prices)?;
        info!(
            "Loaded prices for {} assets over {} dates from {}",
            panel.assets().len(),
            panel.len(),
            path.as_ref().display()
        );
        Ok(panel)
    }

    /// Load prices for `universe` over `[start, end]`, then clean them if
    /// enabled. An empty universe keeps every asset in the file.
    ///
    /// Cleaning only sees the restricted panel.
    pub fn load_price_universe(
        &self,
        path: impl AsRef<Path>,
        universe: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> LoaderResult<PricePanel> {
        let raw = self.load_prices(path)?;
        let panel = raw.restrict(universe, start, end)?;
        if panel.len() < raw.len() || panel.assets().len() < raw.assets().len() {
            info!(
                "Restricted prices to {} assets x {} dates (file has {} x {})",
                panel.assets().len(),
                panel.len(),
                raw.assets().len(),
                raw.len()
            );
        }

        if !self.clean_prices {
            return Ok(panel);
        }

        let before = panel.len();
        let series = (0..panel.assets().len())
            .map(|a| panel.series_at(a).to_vec())
            .collect();
        let (dates, series) = clean_prices(panel.dates().to_vec(), series);
        if dates.len() < before {
            warn!(
                "Price cleaning dropped {} of {} dates",
                before - dates.len(),
                before
            );
        }
        Ok(PricePanel::new(dates, panel.assets().to_vec(), series)?)
    }

    /// Load a long feature file.
    pub fn load_features(&self, path: impl AsRef<Path>) -> LoaderResult<FeaturePanel> {
        let df = read_csv(path.as_ref())?;
        let columns = df.get_columns();

        if columns.len() < 3 {
            return Err(LoaderError::InvalidData(format!(
                "feature file needs date, asset and at least one feature column, found {} columns",
                columns.len()
            )));
        }

        let keys = key_columns(&columns[0], &columns[1])?;
        let names: Vec<String> = columns[2..]
            .iter()
            .map(|c| c.name().as_str().to_string())
            .collect();
        let values = columns[2..]
            .iter()
            .map(float_column)
            .collect::<LoaderResult<Vec<_>>>()?;

        let mut panel = FeaturePanel::new(names);
        for (row, key) in keys.into_iter().enumerate() {
            let row_values = values
                .iter()
                .enumerate()
                .map(|(j, col)| {
                    col[row].ok_or_else(|| {
                        LoaderError::InvalidData(format!(
                            "empty feature cell {} for {}",
                            panel.names()[j],
                            key
                        ))
                    })
                })
                .collect::<LoaderResult<Vec<_>>>()?;
            panel.insert(key, row_values)?;
        }

        info!(
            "Loaded {} feature rows x {} features from {}",
            panel.len(),
            panel.names().len(),
            path.as_ref().display()
        );
        Ok(panel)
    }

    /// Load a label file.
    pub fn load_labels(&self, path: impl AsRef<Path>) -> LoaderResult<ScalarPanel> {
        self.load_scalar(path.as_ref())
    }

    /// Load a prediction file.
    pub fn load_predictions(&self, path: impl AsRef<Path>) -> LoaderResult<ScalarPanel> {
        self.load_scalar(path.as_ref())
    }

    fn load_scalar(&self, path: &Path) -> LoaderResult<ScalarPanel> {
        let df = read_csv(path)?;
        let columns = df.get_columns();

        if columns.len() != 3 {
            return Err(LoaderError::InvalidData(format!(
                "expected date, asset and one value column, found {} columns",
                columns.len()
            )));
        }

        let keys = key_columns(&columns[0], &columns[1])?;
        let values = float_column(&columns[2])?;

        let mut panel = ScalarPanel::new(columns[2].name().as_str());
        for (key, value) in keys.into_iter().zip(values) {
            let value = value.ok_or_else(|| {
                LoaderError::InvalidData(format!("empty {} cell for {}", panel.column(), key))
            })?;
            panel.insert(key, value)?;
        }

        info!(
            "Loaded {} {} rows from {}",
            panel.len(),
            panel.column(),
            path.display()
        );
        Ok(panel)
    }

    /// Write a wide price file.
    pub fn write_prices(&self, panel: &PricePanel, path: impl AsRef<Path>) -> LoaderResult<()> {
        let mut columns = Vec::with_capacity(panel.assets().len() + 1);
        columns.push(Column::new(DATE_COLUMN.into(), format_dates(panel.dates())));
        for (idx, asset) in panel.assets().iter().enumerate() {
            columns.push(Column::new(asset.as_str().into(), panel.series_at(idx).to_vec()));
        }
        write_csv(DataFrame::new(columns)?, path.as_ref())
    }

    /// Write a long feature file.
    pub fn write_features(&self, panel: &FeaturePanel, path: impl AsRef<Path>) -> LoaderResult<()> {
        let mut columns = key_series(panel.keys());
        for (j, name) in panel.names().iter().enumerate() {
            let values: Vec<f64> = panel.iter().map(|(_, row)| row[j]).collect();
            columns.push(Column::new(name.as_str().into(), values));
        }
        write_csv(DataFrame::new(columns)?, path.as_ref())
    }

    /// Write a label or prediction file.
    pub fn write_scalar(&self, panel: &ScalarPanel, path: impl AsRef<Path>) -> LoaderResult<()> {
        let mut columns = key_series(panel.keys());
        let values: Vec<f64> = panel.iter().map(|(_, v)| v).collect();
        columns.push(Column::new(panel.column().into(), values));
        write_csv(DataFrame::new(columns)?, path.as_ref())
    }
}

/// Drop dates with no price at all, forward-fill each asset, then drop dates
/// where any asset is still missing.
pub fn clean_prices(
    dates: Vec<NaiveDate>,
    columns: Vec<Vec<Option<f64>>>,
) -> (Vec<NaiveDate>, Vec<Vec<Option<f64>>>) {
    let keep: Vec<usize> = (0..dates.len())
        .filter(|&i| columns.iter().any(|c| c[i].is_some()))
        .collect();

    let filled: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|column| {
            let mut last = None;
            keep.iter()
                .map(|&i| {
                    if column[i].is_some() {
                        last = column[i];
                    }
                    last
                })
                .collect()
        })
        .collect();

    let complete: Vec<usize> = (0..keep.len())
        .filter(|&k| filled.iter().all(|c| c[k].is_some()))
        .collect();

    let dates = complete.iter().map(|&k| dates[keep[k]]).collect();
    let columns = filled
        .iter()
        .map(|c| complete.iter().map(|&k| c[k]).collect())
        .collect();
    (dates, columns)
}

fn read_csv(path: &Path) -> LoaderResult<DataFrame> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

fn write_csv(mut df: DataFrame, path: &Path) -> LoaderResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Parse an ISO date, ignoring any time component.
pub fn parse_date(raw: &str) -> LoaderResult<NaiveDate> {
    let trimmed = raw.trim();
    let day = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| LoaderError::InvalidData(format!("invalid date {:?}: {}", raw, e)))
}

fn format_dates(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

fn string_column(column: &Column) -> LoaderResult<Vec<String>> {
    let casted = column.cast(&DataType::String)?;
    casted
        .str()?
        .into_iter()
        .map(|v| {
            v.map(|s| s.to_string()).ok_or_else(|| {
                LoaderError::InvalidData(format!("empty cell in column {}", column.name()))
            })
        })
        .collect()
}

fn date_column(column: &Column) -> LoaderResult<Vec<NaiveDate>> {
    string_column(column)?.iter().map(|s| parse_date(s)).collect()
}

fn float_column(column: &Column) -> LoaderResult<Vec<Option<f64>>> {
    let casted = column.strict_cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

fn key_columns(dates: &Column, assets: &Column) -> LoaderResult<Vec<PanelKey>> {
    let dates = date_column(dates)?;
    let assets = string_column(assets)?;
    Ok(dates
        .into_iter()
        .zip(assets)
        .map(|(date, asset)| PanelKey { date, asset })
        .collect())
}

fn key_series<'a>(keys: impl Iterator<Item = &'a PanelKey>) -> Vec<Column> {
    let (dates, assets): (Vec<String>, Vec<String>) = keys
        .map(|k| (k.date.format("%Y-%m-%d").to_string(), k.asset.clone()))
        .unzip();
    vec![
        Column::new(DATE_COLUMN.into(), dates),
        Column::new(ASSET_COLUMN.into(), assets),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{LABEL_COLUMN, PREDICTION_COLUMN};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("walkforward-loader-{}-{}", std::process::id(), name))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2023-05-02").unwrap(), day(2));
        assert_eq!(parse_date("2023-05-02 00:00:00").unwrap(), day(2));
        assert!(parse_date("05/02/2023").is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = DataLoader::new().load_prices(temp_path("does-not-exist.csv"));
        assert!(matches!(result, Err(LoaderError::FileNotFound(_))));
    }

    #[test]
    fn test_load_prices_with_missing_cells() {
        let path = temp_path("prices.csv");
        std::fs::write(
            &path,
            "Date,AAA,BBB\n2023-05-01,10,20.5\n2023-05-02,,21\n2023-05-03,11.5,\n",
        )
        .unwrap();

        let panel = DataLoader::new().load_prices(&path).unwrap();
        assert_eq!(panel.assets(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(panel.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(panel.series("AAA").unwrap(), &[Some(10.0), None, Some(11.5)]);
        assert_eq!(panel.series("BBB").unwrap(), &[Some(20.5), Some(21.0), None]);

        let cleaned = DataLoader::new()
            .with_price_cleaning(true)
            .load_price_universe(&path, &[], None, None)
            .unwrap();
        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned.series("AAA").unwrap(), &[Some(10.0), Some(10.0), Some(11.5)]);
        assert_eq!(cleaned.series("BBB").unwrap(), &[Some(20.5), Some(21.0), Some(21.0)]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cleaning_ignores_assets_outside_universe() {
        let path = temp_path("late-listing.csv");
        // ZZZ lists on day 4; AAA trades every day
        let mut csv = String::from("date,AAA,ZZZ\n");
        for d in 1..=8 {
            let zzz = if d >= 4 { format!("{}", 50 + d) } else { String::new() };
            csv.push_str(&format!("2023-05-0{},{},{}\n", d, 10 + d, zzz));
        }
        std::fs::write(&path, csv).unwrap();

        let loader = DataLoader::new().with_price_cleaning(true);
        let universe = vec!["AAA".to_string()];
        let panel = loader.load_price_universe(&path, &universe, None, None).unwrap();
        assert_eq!(panel.assets(), &["AAA".to_string()]);
        assert_eq!(panel.len(), 8);

        // both assets kept: the dates before ZZZ lists are incomplete
        let both = loader.load_price_universe(&path, &[], None, None).unwrap();
        assert_eq!(both.dates().first(), Some(&day(4)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cleaning_does_not_fill_from_before_start() {
        let path = temp_path("range.csv");
        std::fs::write(
            &path,
            "date,AAA,BBB\n2023-05-01,10,20\n2023-05-02,11,\n2023-05-03,12,22\n",
        )
        .unwrap();

        let panel = DataLoader::new()
            .with_price_cleaning(true)
            .load_price_universe(&path, &[], Some(day(2)), None)
            .unwrap();
        // BBB's day-1 price is outside the range, so day 2 stays incomplete
        assert_eq!(panel.dates(), &[day(3)]);
        assert_eq!(panel.series("BBB").unwrap(), &[Some(22.0)]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_prices_rejects_unsorted_dates() {
        let path = temp_path("unsorted.csv");
        std::fs::write(&path, "date,AAA\n2023-05-02,10\n2023-05-01,11\n").unwrap();
        let result = DataLoader::new().load_prices(&path);
        assert!(matches!(
            result,
            Err(LoaderError::Panel(PipelineError::InvalidPanel(_)))
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_clean_prices_drops_leading_gap() {
        let dates = vec![day(1), day(2), day(3), day(4)];
        let columns = vec![
            vec![None, Some(1.0), None, Some(1.2)],
            vec![None, None, Some(2.0), None],
        ];
        let (dates, columns) = clean_prices(dates, columns);

        assert_eq!(dates, vec![day(3), day(4)]);
        assert_eq!(columns[0], vec![Some(1.0), Some(1.2)]);
        assert_eq!(columns[1], vec![Some(2.0), Some(2.0)]);
    }

    #[test]
    fn test_feature_file_round_trip() {
        let path = temp_path("features.csv");
        let mut panel = FeaturePanel::new(vec!["mom".to_string(), "vol".to_string()]);
        panel
            .insert(PanelKey::new(day(1), "AAA"), vec![0.125, 0.01])
            .unwrap();
        panel
            .insert(PanelKey::new(day(1), "BBB"), vec![-0.5, 0.02])
            .unwrap();

        let loader = DataLoader::new();
        loader.write_features(&panel, &path).unwrap();
        let loaded = loader.load_features(&path).unwrap();

        assert_eq!(loaded, panel);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_scalar_file_round_trip_keeps_column_name() {
        let path = temp_path("predictions.csv");
        let mut panel = ScalarPanel::new(PREDICTION_COLUMN);
        panel.insert(PanelKey::new(day(2), "AAA"), 0.25).unwrap();
        panel.insert(PanelKey::new(day(3), "AAA"), -0.75).unwrap();

        let loader = DataLoader::new();
        loader.write_scalar(&panel, &path).unwrap();
        let loaded = loader.load_predictions(&path).unwrap();

        assert_eq!(loaded.column(), PREDICTION_COLUMN);
        assert_eq!(loaded, panel);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_label_file_rejects_empty_cell() {
        let path = temp_path("labels.csv");
        std::fs::write(
            &path,
            format!("date,asset,{}\n2023-05-01,AAA,0.1\n2023-05-02,AAA,\n", LABEL_COLUMN),
        )
        .unwrap();
        let result = DataLoader::new().load_labels(&path);
        assert!(matches!(result, Err(LoaderError::InvalidData(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_duplicate_label_key_is_rejected() {
        let path = temp_path("dup-labels.csv");
        std::fs::write(
            &path,
            "date,asset,target_return\n2023-05-01,AAA,0.1\n2023-05-01,AAA,0.2\n",
        )
        .unwrap();
        let result = DataLoader::new().load_labels(&path);
        assert!(matches!(result, Err(LoaderError::Panel(_))));
        std::fs::remove_file(&path).ok();
    }
}
