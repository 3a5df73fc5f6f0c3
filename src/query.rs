//! Read-side queries over the snapshot.
//!
//! Every query is a Polars lazy plan over the snapshot frame, collected into
//! small typed rows. Slots are compared as their `HH:MM` strings, which sort
//! in service-day order because 24:xx is kept as hour 24.

use crate::constants::{DAY_SATURDAY, DAY_SUNDAY, DAY_WEEKDAY, columns};
use crate::error::{CongestionError, Result};
use crate::models::{LongTable, TimeSlot};
use crate::schema::table_to_frame;

use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const MEAN: &str = "mean";
const MAX: &str = "max";
const MIN: &str = "min";
const ROWS: &str = "rows";
const STATIONS: &str = "stations";

/// Day-type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DayFilter {
    #[default]
    All,
    Weekday,
    Saturday,
    Sunday,
    /// Saturday or Sunday
    Holiday,
}

impl DayFilter {
    pub fn label(&self) -> &'static str {
        match self {
            DayFilter::All => "전체",
            DayFilter::Weekday => DAY_WEEKDAY,
            DayFilter::Saturday => DAY_SATURDAY,
            DayFilter::Sunday => DAY_SUNDAY,
            DayFilter::Holiday => "휴일",
        }
    }

    fn expr(&self) -> Option<Expr> {
        let day = |label: &str| col(columns::DAY_TYPE).eq(lit(label));
        match self {
            DayFilter::All => None,
            DayFilter::Weekday => Some(day(DAY_WEEKDAY)),
            DayFilter::Saturday => Some(day(DAY_SATURDAY)),
            DayFilter::Sunday => Some(day(DAY_SUNDAY)),
            DayFilter::Holiday => Some(day(DAY_SATURDAY).or(day(DAY_SUNDAY))),
        }
    }
}

impl fmt::Display for DayFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DayFilter {
    type Err = CongestionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "all" | "전체" => Ok(DayFilter::All),
            "weekday" | "평일" => Ok(DayFilter::Weekday),
            "saturday" | "토요일" => Ok(DayFilter::Saturday),
            "sunday" | "일요일" => Ok(DayFilter::Sunday),
            "holiday" | "휴일" => Ok(DayFilter::Holiday),
            other => Err(CongestionError::query(format!(
                "unknown day filter '{}' (expected all, weekday, saturday, sunday or holiday)",
                other
            ))),
        }
    }
}

/// Row selection shared by the dashboard views
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub day: DayFilter,
    /// Keep only these lines; empty keeps all
    pub lines: Vec<String>,
    /// Inclusive hour window: slots from `start:00` through `end:00`
    pub hours: Option<(u8, u8)>,
}

impl QueryFilter {
    pub fn day(day: DayFilter) -> Self {
        Self {
            day,
            ..Default::default()
        }
    }
}

fn slot_lit(slot: TimeSlot) -> Expr {
    lit(slot.to_string())
}

fn slot_window(start: TimeSlot, end: TimeSlot) -> Expr {
    col(columns::TIME_SLOT)
        .gt_eq(slot_lit(start))
        .and(col(columns::TIME_SLOT).lt_eq(slot_lit(end)))
}

fn hour_slot(hour: u8) -> Result<TimeSlot> {
    TimeSlot::new(hour, 0)
        .ok_or_else(|| CongestionError::query(format!("hour {} is outside 0-24", hour)))
}

fn with_day(frame: LazyFrame, day: DayFilter) -> LazyFrame {
    match day.expr() {
        Some(predicate) => frame.filter(predicate),
        None => frame,
    }
}

/// Apply a [`QueryFilter`] to a snapshot frame
pub fn filter_frame(frame: LazyFrame, filter: &QueryFilter) -> Result<LazyFrame> {
    let mut frame = with_day(frame, filter.day);

    let line_match = filter
        .lines
        .iter()
        .map(|line| col(columns::LINE).eq(lit(line.as_str())))
        .reduce(|a, b| a.or(b));
    if let Some(predicate) = line_match {
        frame = frame.filter(predicate);
    }

    if let Some((start, end)) = filter.hours {
        if start > end {
            return Err(CongestionError::query(format!(
                "hour window {}..{} is reversed",
                start, end
            )));
        }
        frame = frame.filter(slot_window(hour_slot(start)?, hour_slot(end)?));
    }
    Ok(frame)
}

fn strings(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(df
        .column(name)?
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn floats(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn integers(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().map(|v| v.unwrap_or(0)).collect())
}

fn slots(df: &DataFrame) -> Result<Vec<TimeSlot>> {
    strings(df, columns::TIME_SLOT)?
        .iter()
        .map(|s| {
            s.parse::<TimeSlot>()
                .map_err(|e| CongestionError::query(format!("bad time slot in snapshot: {}", e)))
        })
        .collect()
}

fn descending_then(descending: bool, ties: usize) -> SortMultipleOptions {
    SortMultipleOptions::default()
        .with_order_descending_multi(std::iter::once(descending).chain(std::iter::repeat_n(false, ties)))
        .with_maintain_order(true)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineCongestion {
    pub line: String,
    pub line_sort_key: i64,
    pub mean: f64,
    /// Distinct station names on the line
    pub stations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCongestion {
    pub time_slot: TimeSlot,
    /// Present when split by day type
    pub day_type: Option<String>,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRank {
    pub rank: usize,
    pub line: String,
    pub station_name: String,
    pub mean: f64,
    pub max: f64,
}

/// Busiest and quietest slot by mean congestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakInfo {
    pub peak_slot: TimeSlot,
    pub peak_mean: f64,
    pub quiet_slot: TimeSlot,
    pub quiet_mean: f64,
}

/// Per-station summary. All zero with no slots for an unknown station.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub peak_slot: Option<TimeSlot>,
    pub peak_value: f64,
    pub quiet_slot: Option<TimeSlot>,
    pub quiet_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Breakdown {
    Direction,
    DayType,
}

impl Breakdown {
    fn column(&self) -> &'static str {
        match self {
            Breakdown::Direction => columns::DIRECTION,
            Breakdown::DayType => columns::DAY_TYPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownRow {
    /// Direction or day type, depending on the breakdown
    pub group: String,
    pub time_slot: TimeSlot,
    pub mean: f64,
}

/// Station mean at one slot or over a slot window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMean {
    pub rank: usize,
    pub station_name: String,
    pub line: String,
    pub line_sort_key: i64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowPeak {
    pub time_slot: TimeSlot,
    pub value: f64,
    pub window_mean: f64,
}

/// Commute-window peaks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeakHoursPattern {
    /// 07:00 through 09:00
    pub morning: Option<WindowPeak>,
    /// 17:00 through 19:00
    pub evening: Option<WindowPeak>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotComparison {
    pub station_name: String,
    pub line: String,
    pub first: f64,
    pub second: f64,
    /// `second - first`
    pub difference: f64,
    pub mean: f64,
}

/// Queries over one snapshot frame
#[derive(Clone)]
pub struct CongestionQuery {
    frame: LazyFrame,
}

impl CongestionQuery {
    pub fn new(frame: LazyFrame) -> Self {
        Self { frame }
    }

    pub fn from_table(table: &LongTable) -> Result<Self> {
        Ok(Self::new(table_to_frame(table)?.lazy()))
    }

    /// Restrict every later query to the filtered rows
    pub fn filtered(&self, filter: &QueryFilter) -> Result<Self> {
        Ok(Self::new(filter_frame(self.frame.clone(), filter)?))
    }

    pub fn frame(&self) -> LazyFrame {
        self.frame.clone()
    }

    /// Mean congestion and station count per line, in line order
    pub fn congestion_by_line(&self) -> Result<Vec<LineCongestion>> {
        let df = self
            .frame()
            .group_by([col(columns::LINE)])
            .agg([
                col(columns::CONGESTION_VALUE).mean().alias(MEAN),
                col(columns::STATION_NAME).n_unique().alias(STATIONS),
                col(columns::LINE_SORT_KEY).first(),
            ])
            .sort_by_exprs(
                [col(columns::LINE_SORT_KEY), col(columns::LINE)],
                SortMultipleOptions::default(),
            )
            .collect()?;

        let lines = strings(&df, columns::LINE)?;
        let keys = integers(&df, columns::LINE_SORT_KEY)?;
        let means = floats(&df, MEAN)?;
        let stations = integers(&df, STATIONS)?;
        Ok((0..df.height())
            .map(|i| LineCongestion {
                line: lines[i].clone(),
                line_sort_key: keys[i],
                mean: means[i],
                stations: stations[i] as usize,
            })
            .collect())
    }

    /// Mean congestion per slot, optionally split by day type
    pub fn congestion_by_time(&self, by_day_type: bool) -> Result<Vec<SlotCongestion>> {
        let mut keys = vec![col(columns::TIME_SLOT)];
        if by_day_type {
            keys.push(col(columns::DAY_TYPE));
        }
        let df = self
            .frame()
            .group_by(keys.clone())
            .agg([col(columns::CONGESTION_VALUE).mean().alias(MEAN)])
            .sort_by_exprs(keys, SortMultipleOptions::default())
            .collect()?;

        let time_slots = slots(&df)?;
        let means = floats(&df, MEAN)?;
        let days: Vec<Option<String>> = if by_day_type {
            strings(&df, columns::DAY_TYPE)?.into_iter().map(Some).collect()
        } else {
            vec![None; df.height()]
        };
        Ok(time_slots
            .into_iter()
            .zip(days)
            .zip(means)
            .map(|((time_slot, day_type), mean)| SlotCongestion {
                time_slot,
                day_type,
                mean,
            })
            .collect())
    }

    /// Stations ranked by mean congestion, busiest first unless `ascending`
    pub fn top_stations(&self, n: usize, ascending: bool) -> Result<Vec<StationRank>> {
        let df = self
            .frame()
            .group_by([col(columns::LINE), col(columns::STATION_NAME)])
            .agg([
                col(columns::CONGESTION_VALUE).mean().alias(MEAN),
                col(columns::CONGESTION_VALUE).max().alias(MAX),
                col(columns::LINE_SORT_KEY).first(),
            ])
            .sort_by_exprs(
                [
                    col(MEAN),
                    col(columns::LINE_SORT_KEY),
                    col(columns::STATION_NAME),
                ],
                descending_then(!ascending, 2),
            )
            .limit(n as IdxSize)
            .collect()?;

        let lines = strings(&df, columns::LINE)?;
        let names = strings(&df, columns::STATION_NAME)?;
        let means = floats(&df, MEAN)?;
        let maxes = floats(&df, MAX)?;
        Ok((0..df.height())
            .map(|i| StationRank {
                rank: i + 1,
                line: lines[i].clone(),
                station_name: names[i].clone(),
                mean: means[i],
                max: maxes[i],
            })
            .collect())
    }

    /// Busiest and quietest slot; `None` on an empty frame
    pub fn peak_info(&self) -> Result<Option<PeakInfo>> {
        let by_slot = self.congestion_by_time(false)?;
        Ok(extremes(&by_slot).map(|(peak, quiet)| PeakInfo {
            peak_slot: peak.time_slot,
            peak_mean: peak.mean,
            quiet_slot: quiet.time_slot,
            quiet_mean: quiet.mean,
        }))
    }

    /// Line labels in line order
    pub fn line_list(&self) -> Result<Vec<String>> {
        Ok(self
            .congestion_by_line()?
            .into_iter()
            .map(|l| l.line)
            .collect())
    }

    /// Distinct slots in schedule order
    pub fn time_slots(&self) -> Result<Vec<TimeSlot>> {
        let df = self
            .frame()
            .group_by([col(columns::TIME_SLOT)])
            .agg([len().alias(ROWS)])
            .sort_by_exprs([col(columns::TIME_SLOT)], SortMultipleOptions::default())
            .collect()?;
        slots(&df)
    }

    /// Sorted station names, on one line or across all lines
    pub fn station_list(&self, line: Option<&str>) -> Result<Vec<String>> {
        let frame = match line {
            Some(line) => self.frame().filter(col(columns::LINE).eq(lit(line))),
            None => self.frame(),
        };
        let df = frame
            .group_by([col(columns::STATION_NAME)])
            .agg([len().alias(ROWS)])
            .sort_by_exprs([col(columns::STATION_NAME)], SortMultipleOptions::default())
            .collect()?;
        strings(&df, columns::STATION_NAME)
    }

    fn station_frame(&self, station: &str, line: &str) -> LazyFrame {
        self.frame().filter(
            col(columns::STATION_NAME)
                .eq(lit(station))
                .and(col(columns::LINE).eq(lit(line))),
        )
    }

    /// Mean, max and min of one station plus its peak and quiet slots
    pub fn station_stats(&self, station: &str, line: &str) -> Result<StationStats> {
        let frame = self.station_frame(station, line);
        let df = frame
            .clone()
            .select([
                col(columns::CONGESTION_VALUE).mean().alias(MEAN),
                col(columns::CONGESTION_VALUE).max().alias(MAX),
                col(columns::CONGESTION_VALUE).min().alias(MIN),
                len().alias(ROWS),
            ])
            .collect()?;

        if integers(&df, ROWS)?.first().copied().unwrap_or(0) == 0 {
            return Ok(StationStats::default());
        }

        let by_slot = CongestionQuery::new(frame).congestion_by_time(false)?;
        let (peak, quiet) = match extremes(&by_slot) {
            Some((peak, quiet)) => (Some(peak), Some(quiet)),
            None => (None, None),
        };
        Ok(StationStats {
            mean: floats(&df, MEAN)?[0],
            max: floats(&df, MAX)?[0],
            min: floats(&df, MIN)?[0],
            peak_slot: peak.map(|p| p.time_slot),
            peak_value: peak.map_or(0.0, |p| p.mean),
            quiet_slot: quiet.map(|q| q.time_slot),
            quiet_value: quiet.map_or(0.0, |q| q.mean),
        })
    }

    /// Per-slot means of one station split by direction or day type
    pub fn station_breakdown(
        &self,
        station: &str,
        line: &str,
        by: Breakdown,
    ) -> Result<Vec<BreakdownRow>> {
        let keys = [col(columns::TIME_SLOT), col(by.column())];
        let df = self
            .station_frame(station, line)
            .group_by(keys.clone())
            .agg([col(columns::CONGESTION_VALUE).mean().alias(MEAN)])
            .sort_by_exprs(keys, SortMultipleOptions::default())
            .collect()?;

        let groups = strings(&df, by.column())?;
        let time_slots = slots(&df)?;
        let means = floats(&df, MEAN)?;
        Ok(groups
            .into_iter()
            .zip(time_slots)
            .zip(means)
            .map(|((group, time_slot), mean)| BreakdownRow {
                group,
                time_slot,
                mean,
            })
            .collect())
    }

    fn station_means(
        &self,
        window: Expr,
        day: DayFilter,
        ascending: bool,
        n: Option<usize>,
    ) -> Result<Vec<StationMean>> {
        let plan = with_day(self.frame().filter(window), day)
            .group_by([
                col(columns::STATION_NAME),
                col(columns::LINE),
                col(columns::LINE_SORT_KEY),
            ])
            .agg([col(columns::CONGESTION_VALUE).mean().alias(MEAN)])
            .sort_by_exprs(
                [
                    col(MEAN),
                    col(columns::LINE_SORT_KEY),
                    col(columns::STATION_NAME),
                ],
                descending_then(!ascending, 2),
            );
        let plan = match n {
            Some(n) => plan.limit(n as IdxSize),
            None => plan,
        };
        let df = plan.collect()?;

        let names = strings(&df, columns::STATION_NAME)?;
        let lines = strings(&df, columns::LINE)?;
        let keys = integers(&df, columns::LINE_SORT_KEY)?;
        let means = floats(&df, MEAN)?;
        Ok((0..df.height())
            .map(|i| StationMean {
                rank: i + 1,
                station_name: names[i].clone(),
                line: lines[i].clone(),
                line_sort_key: keys[i],
                mean: means[i],
            })
            .collect())
    }

    /// Every station's mean at one slot, busiest first; directions are averaged
    pub fn congestion_at_slot(&self, slot: TimeSlot, day: DayFilter) -> Result<Vec<StationMean>> {
        self.station_means(col(columns::TIME_SLOT).eq(slot_lit(slot)), day, false, None)
    }

    pub fn top_stations_at_slot(
        &self,
        slot: TimeSlot,
        n: usize,
        ascending: bool,
        day: DayFilter,
    ) -> Result<Vec<StationMean>> {
        self.station_means(
            col(columns::TIME_SLOT).eq(slot_lit(slot)),
            day,
            ascending,
            Some(n),
        )
    }

    /// Station means inside an inclusive slot window, busiest first
    pub fn time_range_congestion(
        &self,
        start: TimeSlot,
        end: TimeSlot,
        day: DayFilter,
    ) -> Result<Vec<StationMean>> {
        if start > end {
            return Err(CongestionError::query(format!(
                "slot window {}..{} is reversed",
                start, end
            )));
        }
        self.station_means(slot_window(start, end), day, false, None)
    }

    /// Compare stations between two slots, ranked by the mean of both
    pub fn compare_time_slots(
        &self,
        first: TimeSlot,
        second: TimeSlot,
        day: DayFilter,
        n: usize,
    ) -> Result<Vec<SlotComparison>> {
        let later: HashMap<(String, String), f64> = self
            .congestion_at_slot(second, day)?
            .into_iter()
            .map(|s| ((s.station_name, s.line), s.mean))
            .collect();

        let mut rows: Vec<SlotComparison> = self
            .congestion_at_slot(first, day)?
            .into_iter()
            .filter_map(|s| {
                let second = *later.get(&(s.station_name.clone(), s.line.clone()))?;
                Some(SlotComparison {
                    difference: second - s.mean,
                    mean: (s.mean + second) / 2.0,
                    station_name: s.station_name,
                    line: s.line,
                    first: s.mean,
                    second,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        rows.truncate(n);
        Ok(rows)
    }

    /// Peak slot and window mean for the morning and evening commutes
    pub fn peak_hours_pattern(&self, day: DayFilter) -> Result<PeakHoursPattern> {
        let by_slot = CongestionQuery::new(with_day(self.frame(), day)).congestion_by_time(false)?;
        let window = |from: u8, to: u8| -> Result<Option<WindowPeak>> {
            let (from, to) = (hour_slot(from)?, hour_slot(to)?);
            let inside: Vec<&SlotCongestion> = by_slot
                .iter()
                .filter(|s| s.time_slot >= from && s.time_slot <= to)
                .collect();
            let Some((peak, _)) = extremes_of(&inside) else {
                return Ok(None);
            };
            Ok(Some(WindowPeak {
                time_slot: peak.time_slot,
                value: peak.mean,
                window_mean: inside.iter().map(|s| s.mean).sum::<f64>() / inside.len() as f64,
            }))
        };

        Ok(PeakHoursPattern {
            morning: window(7, 9)?,
            evening: window(17, 19)?,
        })
    }
}

impl fmt::Debug for CongestionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CongestionQuery").finish_non_exhaustive()
    }
}

fn extremes(rows: &[SlotCongestion]) -> Option<(&SlotCongestion, &SlotCongestion)> {
    let refs: Vec<&SlotCongestion> = rows.iter().collect();
    extremes_of(&refs)
}

/// First maximum and first minimum by mean, in slot order
fn extremes_of<'a>(rows: &[&'a SlotCongestion]) -> Option<(&'a SlotCongestion, &'a SlotCongestion)> {
    let first = *rows.first()?;
    Some(rows.iter().fold((first, first), |(peak, quiet), &row| {
        (
            if row.mean > peak.mean { row } else { peak },
            if row.mean < quiet.mean { row } else { quiet },
        )
    }))
}
