use serde::{Deserialize, Serialize};

use crate::roster::{Gender, ScoreSlot, StudentRecord};

pub const PASS_MARK: f64 = 10.0;

/// One-decimal rounding used for displayed averages and rates:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStatistics {
    pub total_students: usize,
    pub students_above10: usize,
    pub students_below10: usize,
    pub female_above10: usize,
    pub female_below10: usize,
    pub male_above10: usize,
    pub male_below10: usize,
    pub average_grade: f64,
    pub pass_rate: f64,
}

pub fn calculate_statistics(records: &[StudentRecord], slot: ScoreSlot) -> GradeStatistics {
    let graded: Vec<(Gender, f64)> = records
        .iter()
        .filter_map(|r| r.score(slot).map(|s| (r.gender, s)))
        .collect();
    if graded.is_empty() {
        return GradeStatistics::default();
    }

    let mut stats = GradeStatistics {
        total_students: graded.len(),
        ..GradeStatistics::default()
    };
    let mut sum = 0.0;
    for (gender, score) in &graded {
        sum += score;
        let passed = *score >= PASS_MARK;
        match (gender, passed) {
            (Gender::Female, true) => stats.female_above10 += 1,
            (Gender::Female, false) => stats.female_below10 += 1,
            (Gender::Male, true) => stats.male_above10 += 1,
            (Gender::Male, false) => stats.male_below10 += 1,
        }
    }
    stats.students_above10 = stats.female_above10 + stats.male_above10;
    stats.students_below10 = stats.female_below10 + stats.male_below10;

    let count = graded.len() as f64;
    stats.average_grade = round_off_1_decimal(sum / count);
    stats.pass_rate = round_off_1_decimal(100.0 * stats.students_above10 as f64 / count);
    stats
}

/// Planned vs completed counters read from the template's side table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TermCounters {
    pub courses_expected: u64,
    pub courses_done: u64,
    pub hours_expected: u64,
    pub hours_done: u64,
    pub practical_expected: u64,
    pub practical_done: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub expected: u64,
    pub done: u64,
    pub percentage: u64,
}

impl Progress {
    fn new(expected: u64, done: u64) -> Self {
        let percentage = if expected > 0 {
            (100.0 * done as f64 / expected as f64).round() as u64
        } else {
            0
        };
        Self {
            expected,
            done,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStatistics {
    pub courses: Progress,
    pub hours: Progress,
    pub practical: Progress,
}

pub fn calculate_term_statistics(c: &TermCounters) -> TermStatistics {
    TermStatistics {
        courses: Progress::new(c.courses_expected, c.courses_done),
        hours: Progress::new(c.hours_expected, c.hours_done),
        practical: Progress::new(c.practical_expected, c.practical_done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(grade: Option<f64>, gender: Gender) -> StudentRecord {
        StudentRecord {
            name: "Student".to_string(),
            matricule: None,
            gender,
            score_slot1: grade,
            score_slot2: None,
        }
    }

    #[test]
    fn round_off_one_decimal() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(66.666_666), 66.7);
    }

    #[test]
    fn statistics_over_mixed_genders() {
        let records = vec![
            rec(Some(8.0), Gender::Male),
            rec(Some(12.0), Gender::Female),
            rec(Some(16.0), Gender::Male),
        ];
        let s = calculate_statistics(&records, ScoreSlot::First);
        assert_eq!(s.total_students, 3);
        assert_eq!(s.students_above10, 2);
        assert_eq!(s.students_below10, 1);
        assert_eq!(s.male_above10, 1);
        assert_eq!(s.male_below10, 1);
        assert_eq!(s.female_above10, 1);
        assert_eq!(s.female_below10, 0);
        assert_eq!(s.average_grade, 12.0);
        assert!((s.pass_rate - 66.7).abs() < 1e-9);
    }

    #[test]
    fn statistics_without_scores_are_zero() {
        assert_eq!(
            calculate_statistics(&[], ScoreSlot::First),
            GradeStatistics::default()
        );
        let records = vec![rec(None, Gender::Male), rec(None, Gender::Female)];
        let s = calculate_statistics(&records, ScoreSlot::First);
        assert_eq!(s, GradeStatistics::default());
        assert!(!s.average_grade.is_nan());
        assert!(!s.pass_rate.is_nan());
    }

    #[test]
    fn statistics_use_requested_slot() {
        let mut r = rec(Some(4.0), Gender::Female);
        r.score_slot2 = Some(14.0);
        let s = calculate_statistics(&[r], ScoreSlot::Second);
        assert_eq!(s.female_above10, 1);
        assert_eq!(s.pass_rate, 100.0);
    }

    #[test]
    fn exactly_ten_passes() {
        let s = calculate_statistics(&[rec(Some(10.0), Gender::Male)], ScoreSlot::First);
        assert_eq!(s.male_above10, 1);
    }

    #[test]
    fn term_percentage_is_zero_when_nothing_expected() {
        let t = calculate_term_statistics(&TermCounters {
            courses_expected: 0,
            courses_done: 5,
            hours_expected: 30,
            hours_done: 20,
            practical_expected: 3,
            practical_done: 1,
        });
        assert_eq!(t.courses.percentage, 0);
        assert_eq!(t.hours.percentage, 67);
        assert_eq!(t.practical.percentage, 33);
    }
}
