//! # Daily Run Planning
//!
//! Builds the parameters of the nightly run: yesterday's transaction file, keyed by
//! today's date. When the run fires is up to the external timer (cron, systemd) that
//! launches the binary.

use chrono::{Days, Local, NaiveDate};
use std::path::PathBuf;

use crate::config::ScheduleConfig;
use crate::orchestration::types::RunRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRunPlanner {
    input_directory: PathBuf,
    file_prefix: String,
}

impl DailyRunPlanner {
    pub fn new(input_directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            input_directory: input_directory.into(),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.input_directory.clone(), config.file_prefix.clone())
    }

    /// Request for the run that executes on `today`
    ///
    /// The input is `<input_directory>/<prefix>-<yesterday>` and the run id is today's ISO
    /// date, so one logical run exists per day.
    pub fn plan_for(&self, today: NaiveDate) -> RunRequest {
        let business_date = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let file_name = format!("{}-{}", self.file_prefix, business_date.format("%Y-%m-%d"));

        RunRequest::new(
            self.input_directory.join(file_name),
            today.format("%Y-%m-%d").to_string(),
        )
    }

    /// Request for a run executing now, in local time
    pub fn plan_today(&self) -> RunRequest {
        self.plan_for(Local::now().date_naive())
    }
}

impl Default for DailyRunPlanner {
    fn default() -> Self {
        Self::from_config(&ScheduleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_yesterdays_file_with_todays_run_id() {
        let planner = DailyRunPlanner::new("/data/input", "transactions");
        let request = planner.plan_for(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());

        assert_eq!(
            request.input_file,
            PathBuf::from("/data/input/transactions-2024-05-01")
        );
        assert_eq!(request.run_id, "2024-05-02");
    }

    #[test]
    fn test_month_and_year_boundaries() {
        let planner = DailyRunPlanner::default();
        let request = planner.plan_for(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(
            request.input_file,
            PathBuf::from("input/transactions-2023-12-31")
        );

        let request = planner.plan_for(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(request.input_file.ends_with("transactions-2024-02-29"));
    }
}
