use chrono::NaiveDateTime;
use polars::prelude::PlSmallStr;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One contiguous scheduled portion of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPart {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ScheduledPart {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &ScheduledPart) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A work item the planner places onto the calendar.
///
/// `id` is stable for the task's lifetime; `display_id` is a small
/// human-facing number renumbered on reindex. `scheduled_parts`,
/// `latest_possible_start`, `effective_importance`, and `urgency_score`
/// are owned by the pipeline and recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i32,
    pub display_id: i32,
    pub title: String,
    pub notes: Option<String>,
    /// Authority rank, 1-10.
    pub importance: i32,
    /// Importance inherited from the most urgent successor.
    pub effective_importance: i32,
    /// Intensity/density rate used as load weight, not wall-clock time.
    pub complexity: f64,
    pub estimated_minutes: i64,
    pub due: Option<NaiveDateTime>,
    /// Fraction complete, 0..=1.
    pub progress: f64,
    /// Predecessor task ids; the task may not start before all of them end.
    pub dependencies: Vec<i32>,
    /// Exempt from displacement by the bump allocator.
    pub pinned: bool,
    /// May be split into multiple non-contiguous fragments.
    pub divisible: bool,
    pub completed: bool,
    pub scheduled_parts: Vec<ScheduledPart>,
    pub latest_possible_start: Option<NaiveDateTime>,
    pub urgency_score: f64,
}

impl Task {
    pub fn new(id: i32, title: impl Into<String>, estimated_minutes: i64) -> Self {
        Self {
            id,
            display_id: id,
            title: title.into(),
            notes: None,
            importance: 5,
            effective_importance: 5,
            complexity: 1.0,
            estimated_minutes,
            due: None,
            progress: 0.0,
            dependencies: Vec::new(),
            pinned: false,
            divisible: false,
            completed: false,
            scheduled_parts: Vec::new(),
            latest_possible_start: None,
            urgency_score: 0.0,
        }
    }

    /// Duration expressed in 24-hour days, the unit the urgency decay
    /// formula operates in.
    pub fn duration_days(&self) -> f64 {
        self.estimated_minutes as f64 / 1440.0
    }

    /// Work left after progress, in 24-hour days.
    pub fn remaining_work_days(&self) -> f64 {
        self.duration_days() * (1.0 - self.progress)
    }

    /// Load weight for the density balancer: complexity x duration.
    pub fn load(&self) -> f64 {
        self.complexity * self.estimated_minutes as f64
    }

    pub fn is_scheduled(&self) -> bool {
        !self.scheduled_parts.is_empty()
    }

    pub fn scheduled_minutes(&self) -> i64 {
        self.scheduled_parts
            .iter()
            .map(ScheduledPart::duration_minutes)
            .sum()
    }

    /// End of the last fragment, the moment dependents may start.
    pub fn latest_scheduled_end(&self) -> Option<NaiveDateTime> {
        self.scheduled_parts.iter().map(|p| p.end).max()
    }

    pub fn clear_schedule(&mut self) {
        self.scheduled_parts.clear();
    }

    pub fn to_dataframe_row(&self) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = Vec::with_capacity(18);

        columns.push(Series::new(PlSmallStr::from_static("id"), [self.id]).into_column());
        columns.push(
            Series::new(PlSmallStr::from_static("display_id"), [self.display_id]).into_column(),
        );
        columns.push(
            Series::new(PlSmallStr::from_static("title"), [self.title.as_str()]).into_column(),
        );
        let notes: [Option<&str>; 1] = [self.notes.as_deref()];
        columns.push(Series::new(PlSmallStr::from_static("notes"), notes).into_column());
        columns.push(
            Series::new(PlSmallStr::from_static("importance"), [self.importance]).into_column(),
        );
        columns.push(
            Series::new(
                PlSmallStr::from_static("effective_importance"),
                [self.effective_importance],
            )
            .into_column(),
        );
        columns.push(
            Series::new(PlSmallStr::from_static("complexity"), [self.complexity]).into_column(),
        );
        columns.push(
            Series::new(
                PlSmallStr::from_static("estimated_minutes"),
                [self.estimated_minutes],
            )
            .into_column(),
        );
        columns.push(Self::series_from_datetime("due", self.due)?.into_column());
        columns
            .push(Series::new(PlSmallStr::from_static("progress"), [self.progress]).into_column());
        columns.push(Self::series_from_i32_list("dependencies", &self.dependencies).into_column());
        columns.push(Series::new(PlSmallStr::from_static("pinned"), [self.pinned]).into_column());
        columns.push(
            Series::new(PlSmallStr::from_static("divisible"), [self.divisible]).into_column(),
        );
        columns.push(
            Series::new(PlSmallStr::from_static("completed"), [self.completed]).into_column(),
        );

        let starts: Vec<i64> = self
            .scheduled_parts
            .iter()
            .map(|p| Self::datetime_to_ms(p.start))
            .collect();
        let ends: Vec<i64> = self
            .scheduled_parts
            .iter()
            .map(|p| Self::datetime_to_ms(p.end))
            .collect();
        columns.push(Self::series_from_i64_list("part_starts", &starts).into_column());
        columns.push(Self::series_from_i64_list("part_ends", &ends).into_column());

        columns.push(
            Self::series_from_datetime("latest_possible_start", self.latest_possible_start)?
                .into_column(),
        );
        columns.push(
            Series::new(
                PlSmallStr::from_static("urgency_score"),
                [self.urgency_score],
            )
            .into_column(),
        );

        DataFrame::new(columns)
    }

    pub fn from_dataframe_row(df: &DataFrame, row_idx: usize) -> PolarsResult<Self> {
        let id = df
            .column("id")?
            .i32()?
            .get(row_idx)
            .ok_or_else(|| PolarsError::ComputeError("task row missing id".into()))?;

        let display_id = df.column("display_id")?.i32()?.get(row_idx).unwrap_or(id);
        let title = df
            .column("title")?
            .str()?
            .get(row_idx)
            .unwrap_or("")
            .to_string();
        let notes = df
            .column("notes")?
            .str()?
            .get(row_idx)
            .map(ToOwned::to_owned);

        let dependencies = Self::vec_from_i32_list(df.column("dependencies")?.list()?, row_idx)?;
        let part_starts = Self::vec_from_i64_list(df.column("part_starts")?.list()?, row_idx)?;
        let part_ends = Self::vec_from_i64_list(df.column("part_ends")?.list()?, row_idx)?;
        if part_starts.len() != part_ends.len() {
            return Err(PolarsError::ComputeError(
                format!("task {id} has mismatched fragment columns").into(),
            ));
        }
        let scheduled_parts = part_starts
            .into_iter()
            .zip(part_ends)
            .map(|(s, e)| ScheduledPart::new(Self::ms_to_datetime(s), Self::ms_to_datetime(e)))
            .collect();

        Ok(Self {
            id,
            display_id,
            title,
            notes,
            importance: df.column("importance")?.i32()?.get(row_idx).unwrap_or(5),
            effective_importance: df
                .column("effective_importance")?
                .i32()?
                .get(row_idx)
                .unwrap_or(5),
            complexity: df.column("complexity")?.f64()?.get(row_idx).unwrap_or(1.0),
            estimated_minutes: df
                .column("estimated_minutes")?
                .i64()?
                .get(row_idx)
                .unwrap_or(0),
            due: df
                .column("due")?
                .datetime()?
                .get(row_idx)
                .map(Self::ms_to_datetime),
            progress: df.column("progress")?.f64()?.get(row_idx).unwrap_or(0.0),
            dependencies,
            pinned: df.column("pinned")?.bool()?.get(row_idx).unwrap_or(false),
            divisible: df
                .column("divisible")?
                .bool()?
                .get(row_idx)
                .unwrap_or(false),
            completed: df
                .column("completed")?
                .bool()?
                .get(row_idx)
                .unwrap_or(false),
            scheduled_parts,
            latest_possible_start: df
                .column("latest_possible_start")?
                .datetime()?
                .get(row_idx)
                .map(Self::ms_to_datetime),
            urgency_score: df
                .column("urgency_score")?
                .f64()?
                .get(row_idx)
                .unwrap_or(0.0),
        })
    }

    fn series_from_i32_list(name: &str, values: &[i32]) -> Series {
        let inner = Series::new(PlSmallStr::from_static(""), values.to_vec());
        Series::new(name.into(), &[inner])
    }

    fn series_from_i64_list(name: &str, values: &[i64]) -> Series {
        let inner = Series::new(PlSmallStr::from_static(""), values.to_vec());
        Series::new(name.into(), &[inner])
    }

    fn series_from_datetime(name: &str, value: Option<NaiveDateTime>) -> PolarsResult<Series> {
        let data: [Option<i64>; 1] = [value.map(Self::datetime_to_ms)];
        Series::new(name.into(), data).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
    }

    fn vec_from_i32_list(list: &ListChunked, row_idx: usize) -> PolarsResult<Vec<i32>> {
        if let Some(series) = list.get_as_series(row_idx) {
            Ok(series.i32()?.into_iter().flatten().collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn vec_from_i64_list(list: &ListChunked, row_idx: usize) -> PolarsResult<Vec<i64>> {
        if let Some(series) = list.get_as_series(row_idx) {
            Ok(series.i64()?.into_iter().flatten().collect())
        } else {
            Ok(Vec::new())
        }
    }

    pub(crate) fn datetime_to_ms(value: NaiveDateTime) -> i64 {
        value.and_utc().timestamp_millis()
    }

    pub(crate) fn ms_to_datetime(ms: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp_millis(ms)
            .expect("timestamp within chrono range")
            .naive_utc()
    }
}
