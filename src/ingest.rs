//! Wide-table ingestion.
//!
//! A wide table has one row per lake and one column per observation date:
//!
//! ```text
//! lake_id,lat,lon,2000-01-01,2000-07-01,2001-01-01,...
//! tahoe,39.09,-120.04,4.1,18.3,4.4,...
//! ```
//!
//! Date columns are grouped into target years (calendar years or
//! meteorological season-years) and the cells of each group are reduced to a
//! single value per row.

use crate::error::SchemaError;
use crate::series::{Point, TimeSeries, parse_timestamp, year_start};
use chrono::{DateTime, Datelike, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

/// Meteorological season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    /// December, January, February. December counts towards the next year.
    Djf,
    /// March, April, May.
    Mam,
    /// June, July, August.
    Jja,
    /// September, October, November.
    Son,
}

impl Season {
    /// Season-year a month of `year` belongs to, if the month is in the season.
    fn target_year(self, year: i32, month: u32) -> Option<i32> {
        match (self, month) {
            (Season::Djf, 12) => Some(year + 1),
            (Season::Djf, 1 | 2)
            | (Season::Mam, 3..=5)
            | (Season::Jja, 6..=8)
            | (Season::Son, 9..=11) => Some(year),
            _ => None,
        }
    }
}

/// How the cells of one target year are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Aggregation {
    #[default]
    Avg,
    Max,
    Min,
    /// Population variance (divides by n).
    Var,
    /// Maximum minus minimum.
    Range,
    /// Seasonal grouping; always averaged.
    Season(Season),
}

impl Aggregation {
    fn target_year(self, t: &DateTime<Utc>) -> Option<i32> {
        match self {
            Aggregation::Season(season) => season.target_year(t.year(), t.month()),
            _ => Some(t.year()),
        }
    }

    /// Reduce the values of one group, or `None` if the group is empty.
    pub fn reduce(self, vals: &[f64]) -> Option<f64> {
        if vals.is_empty() {
            return None;
        }
        let n_vals = vals.len() as f64;
        let max = || vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = || vals.iter().copied().fold(f64::INFINITY, f64::min);
        let mean = vals.iter().sum::<f64>() / n_vals;
        let val = match self {
            Aggregation::Avg | Aggregation::Season(_) => mean,
            Aggregation::Max => max(),
            Aggregation::Min => min(),
            Aggregation::Var => vals.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n_vals,
            Aggregation::Range => max() - min(),
        };
        Some(val)
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let agg = match s.trim().to_ascii_lowercase().as_str() {
            "avg" => Aggregation::Avg,
            "max" => Aggregation::Max,
            "min" => Aggregation::Min,
            "var" => Aggregation::Var,
            "range" => Aggregation::Range,
            "djf" => Aggregation::Season(Season::Djf),
            "mam" => Aggregation::Season(Season::Mam),
            "jja" => Aggregation::Season(Season::Jja),
            "son" => Aggregation::Season(Season::Son),
            other => return Err(format!("unknown aggregation mode {other:?}")),
        };
        Ok(agg)
    }
}

impl TryFrom<String> for Aggregation {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Avg => "avg",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Var => "var",
            Aggregation::Range => "range",
            Aggregation::Season(Season::Djf) => "DJF",
            Aggregation::Season(Season::Mam) => "MAM",
            Aggregation::Season(Season::Jja) => "JJA",
            Aggregation::Season(Season::Son) => "SON",
        };
        f.write_str(name)
    }
}

struct Entry {
    id: String,
    coords: Option<(f64, f64)>,
    vals_by_year: Vec<Vec<f64>>,
}

/// Parse a wide table into one [`TimeSeries`] per id.
///
/// Series are returned in order of first appearance of their id. Points
/// outside the inclusive `clip_range` are dropped after aggregation, and
/// series left without points are not returned.
///
/// # Errors
/// Returns a [`SchemaError`] if the header lacks the id column, has no date
/// columns, or none of the date columns falls into the aggregation period.
pub fn ingest_table(
    text: &str,
    id_column: &str,
    agg: Aggregation,
    clip_range: Option<(i32, i32)>,
) -> Result<Vec<TimeSeries>, SchemaError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let header = match lines.next() {
        Some((_, line)) => match parse_line(line) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(Vec::new()),
            Err(err) => return Err(SchemaError::Csv(err.to_string())),
        },
        None => return Ok(Vec::new()),
    };

    let id_idx = header
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| SchemaError::MissingIdColumn(id_column.to_string()))?;
    let lat_idx = header.iter().position(|h| is_header(h, &["lat", "latitude"]));
    let lon_idx = header.iter().position(|h| is_header(h, &["lon", "longitude"]));

    let mut time_cols: Vec<(usize, DateTime<Utc>)> = header
        .iter()
        .enumerate()
        .filter(|&(idx, _)| idx != id_idx)
        .filter_map(|(idx, h)| parse_timestamp(h).map(|t| (idx, t)))
        .collect();
    if time_cols.is_empty() {
        return Err(SchemaError::NoTimeColumns);
    }
    time_cols.sort_by_key(|&(_, t)| t);

    let mut cols_by_year: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (idx, t) in &time_cols {
        if let Some(year) = agg.target_year(t) {
            cols_by_year.entry(year).or_default().push(*idx);
        }
    }
    if cols_by_year.is_empty() {
        return Err(SchemaError::NoTargetYears(agg.to_string()));
    }
    let groups: Vec<(i32, Vec<usize>)> = cols_by_year.into_iter().collect();
    log::debug!(
        "found {} time columns in {} target years",
        time_cols.len(),
        groups.len()
    );

    let mut entries: Vec<Entry> = Vec::new();
    let mut entry_idx: HashMap<String, usize> = HashMap::new();

    for (i_line, line) in lines {
        let record = match parse_line(line) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(err) => {
                log::debug!("skipping line {}: {err}", i_line + 1);
                continue;
            }
        };
        let id = match record.get(id_idx) {
            Some(id) if !id.is_empty() => id,
            _ => continue,
        };

        let i_entry = *entry_idx.entry(id.to_string()).or_insert_with(|| {
            entries.push(Entry {
                id: id.to_string(),
                coords: None,
                vals_by_year: vec![Vec::new(); groups.len()],
            });
            entries.len() - 1
        });
        let entry = &mut entries[i_entry];

        if entry.coords.is_none() {
            entry.coords = coords_from_cells(&record, lat_idx, lon_idx).or_else(|| coords_from_id(id));
        }

        for ((_, cols), vals) in groups.iter().zip(entry.vals_by_year.iter_mut()) {
            vals.extend(cols.iter().filter_map(|&col| parse_cell(record.get(col))));
        }
    }

    let series_vec = entries
        .into_iter()
        .filter_map(|entry| {
            let points: Vec<Point> = groups
                .iter()
                .zip(&entry.vals_by_year)
                .filter(|&(&(year, _), _)| {
                    clip_range.is_none_or(|(start, end)| (start..=end).contains(&year))
                })
                .filter_map(|(&(year, _), vals)| {
                    Some(Point {
                        t: year_start(year)?,
                        v: agg.reduce(vals)?,
                    })
                })
                .collect();
            if points.is_empty() {
                log::debug!("dropping {:?}: no points left", entry.id);
                return None;
            }
            let (lat, lon) = entry.coords.unwrap_or((f64::NAN, f64::NAN));
            Some(TimeSeries {
                label: entry.id.clone(),
                id: entry.id,
                lat,
                lon,
                points,
            })
        })
        .collect();

    Ok(series_vec)
}

/// Parse one line as a standalone record, so an unbalanced quote cannot
/// run into the following lines.
fn parse_line(line: &str) -> Result<Option<StringRecord>, csv::Error> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .transpose()
}

fn is_header(header: &str, names: &[&str]) -> bool {
    names.iter().any(|name| header.eq_ignore_ascii_case(name))
}

fn parse_cell(cell: Option<&str>) -> Option<f64> {
    let cell = cell?;
    // Empty cells are missing values, not zeros.
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coords_from_cells(
    record: &StringRecord,
    lat_idx: Option<usize>,
    lon_idx: Option<usize>,
) -> Option<(f64, f64)> {
    let lat = parse_cell(record.get(lat_idx?))?;
    let lon = parse_cell(record.get(lon_idx?))?;
    Some((lat, lon))
}

/// Find the leftmost `<number> [,_] <number>` pair in an id such as `lake_46.2_6.5`.
fn coords_from_id(id: &str) -> Option<(f64, f64)> {
    let bytes = id.as_bytes();
    (0..bytes.len()).find_map(|start| {
        let lat_end = scan_number(bytes, start)?;
        let mut pos = skip_whitespace(bytes, lat_end);
        if !matches!(bytes.get(pos), Some(b',' | b'_')) {
            return None;
        }
        pos = skip_whitespace(bytes, pos + 1);
        let lon_end = scan_number(bytes, pos)?;
        let lat = id[start..lat_end].parse().ok()?;
        let lon = id[pos..lon_end].parse().ok()?;
        Some((lat, lon))
    })
}

fn scan_number(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    if bytes.get(pos) == Some(&b'-') {
        pos += 1;
    }
    let digits_start = pos;
    pos = skip_digits(bytes, pos);
    if pos == digits_start {
        return None;
    }
    if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
        pos = skip_digits(bytes, pos + 1);
    }
    Some(pos)
}

fn skip_digits(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    pos
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(u8::is_ascii_whitespace) {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn years(series: &TimeSeries) -> Vec<i32> {
        series.years()
    }

    #[test]
    fn missing_id_column_is_a_schema_error() {
        let table = "name,2000-01-01\na,1\n";
        let err = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap_err();
        assert_eq!(err, SchemaError::MissingIdColumn("lake_id".to_string()));
    }

    #[test]
    fn missing_time_columns_is_a_schema_error() {
        let table = "lake_id,lat,lon,depth\na,1,2,3\n";
        let err = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap_err();
        assert_eq!(err, SchemaError::NoTimeColumns);
    }

    #[test]
    fn season_without_matching_months_is_a_schema_error() {
        let table = "lake_id,2000-01-01,2000-02-01\na,1,2\n";
        let err =
            ingest_table(table, "lake_id", Aggregation::Season(Season::Jja), None).unwrap_err();
        assert_eq!(err, SchemaError::NoTargetYears("JJA".to_string()));
    }

    #[test]
    fn empty_table_yields_no_series() {
        let series_vec = ingest_table("", "lake_id", Aggregation::Avg, None).unwrap();
        assert!(series_vec.is_empty());
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let table = "lake_id,2000\n\"Lake \"\"Big\"\", North\",4.5\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        assert_eq!(series_vec.len(), 1);
        assert_eq!(series_vec[0].id, "Lake \"Big\", North");
        assert_eq!(series_vec[0].values(), vec![4.5]);
    }

    #[test]
    fn single_column_per_year_passes_through() {
        let table = "lake_id,2000-01-01,2001-01-01,2002-01-01\na,1.5,-2.0,3.25\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        assert_eq!(series_vec[0].values(), vec![1.5, -2.0, 3.25]);
        assert_eq!(years(&series_vec[0]), vec![2000, 2001, 2002]);
        assert!(
            series_vec[0]
                .points
                .iter()
                .all(|p| p.t == year_start(p.t.year()).unwrap())
        );
    }

    #[test]
    fn yearly_reductions() {
        let table = "lake_id,2000-01-01,2000-04-01,2000-07-01,2001-01-01\na,1,3,8,5\n";
        let reduce = |agg| ingest_table(table, "lake_id", agg, None).unwrap()[0].values();
        assert_eq!(reduce(Aggregation::Avg), vec![4.0, 5.0]);
        assert_eq!(reduce(Aggregation::Max), vec![8.0, 5.0]);
        assert_eq!(reduce(Aggregation::Min), vec![1.0, 5.0]);
        assert_eq!(reduce(Aggregation::Range), vec![7.0, 0.0]);
        let var = reduce(Aggregation::Var);
        assert_abs_diff_eq!(var[0], 26.0 / 3.0, epsilon = 1e-12);
        assert_eq!(var[1], 0.0);
    }

    #[test]
    fn december_folds_into_next_winter() {
        let table = "lake_id,1999-12-01,2000-01-01,2000-02-01,2000-06-01,2000-12-01\n\
                     a,1,2,3,100,7\n";
        let series_vec =
            ingest_table(table, "lake_id", Aggregation::Season(Season::Djf), None).unwrap();
        assert_eq!(years(&series_vec[0]), vec![2000, 2001]);
        assert_eq!(series_vec[0].values(), vec![2.0, 7.0]);
    }

    #[test]
    fn spring_and_autumn_stay_in_their_year() {
        let table = "lake_id,2000-02-01,2000-03-01,2000-05-01,2000-06-01,\
                     2000-09-01,2000-11-01,2000-12-01,2001-04-01\n\
                     a,100,1,3,100,10,20,100,7\n";
        let mam = ingest_table(table, "lake_id", Aggregation::Season(Season::Mam), None).unwrap();
        assert_eq!(years(&mam[0]), vec![2000, 2001]);
        assert_eq!(mam[0].values(), vec![2.0, 7.0]);

        let son = ingest_table(table, "lake_id", Aggregation::Season(Season::Son), None).unwrap();
        assert_eq!(years(&son[0]), vec![2000]);
        assert_eq!(son[0].values(), vec![15.0]);
    }

    #[test]
    fn unbalanced_quote_only_loses_its_own_line() {
        let table = "lake_id,2000,2001\n\"broken,1,2\ngood,3,4\nother,5,6\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        let ids: Vec<_> = series_vec.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "other"]);
        assert_eq!(series_vec[0].values(), vec![3.0, 4.0]);
        assert_eq!(series_vec[1].values(), vec![5.0, 6.0]);
    }

    #[test]
    fn seasons_always_average() {
        let table = "lake_id,2000-06-01,2000-07-01,2000-08-01,2000-09-01\na,1,2,6,50\n";
        let agg = "jja".parse::<Aggregation>().unwrap();
        let series_vec = ingest_table(table, "lake_id", agg, None).unwrap();
        assert_eq!(series_vec[0].values(), vec![3.0]);
    }

    #[test]
    fn empty_and_non_numeric_cells_are_skipped() {
        let table = "lake_id,2000,2001,2002\na,1,,x\nb,,,\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        assert_eq!(series_vec.len(), 1);
        assert_eq!(years(&series_vec[0]), vec![2000]);
    }

    #[test]
    fn rows_accumulate_in_order_of_first_appearance() {
        let table = "lake_id,2000,2001\n\nb,1,\na,5,6\nb,3,4\n,9,9\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        let ids: Vec<_> = series_vec.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(series_vec[0].values(), vec![2.0, 4.0]);
    }

    #[test]
    fn coordinates_from_columns_then_id() {
        let table = "lake_id,Latitude,LON,2000\n\
                     a,46.5,6.6,1\n\
                     lake_-12.5_130,,,2\n\
                     plain,north,,3\n";
        let series_vec = ingest_table(table, "lake_id", Aggregation::Avg, None).unwrap();
        assert_eq!((series_vec[0].lat, series_vec[0].lon), (46.5, 6.6));
        assert_eq!((series_vec[1].lat, series_vec[1].lon), (-12.5, 130.0));
        assert!(series_vec[2].lat.is_nan() && series_vec[2].lon.is_nan());
    }

    #[test]
    fn coords_from_id_patterns() {
        assert_eq!(coords_from_id("45.1, -93.2"), Some((45.1, -93.2)));
        assert_eq!(coords_from_id("site 7 _ 8 east"), Some((7.0, 8.0)));
        assert_eq!(coords_from_id("lake-4"), None);
        assert_eq!(coords_from_id("tahoe"), None);
    }

    #[test]
    fn clip_range_is_inclusive() {
        let table = "lake_id,1999,2000,2001,2002\na,1,2,3,4\nb,9,,,\n";
        let series_vec =
            ingest_table(table, "lake_id", Aggregation::Avg, Some((2000, 2001))).unwrap();
        assert_eq!(series_vec.len(), 1);
        assert_eq!(years(&series_vec[0]), vec![2000, 2001]);
    }

    #[test]
    fn aggregation_names() {
        assert_eq!(" MAX ".parse::<Aggregation>(), Ok(Aggregation::Max));
        assert_eq!("Son".parse::<Aggregation>(), Ok(Aggregation::Season(Season::Son)));
        assert!("median".parse::<Aggregation>().is_err());
        assert_eq!(Aggregation::Season(Season::Djf).to_string(), "DJF");
    }
}
