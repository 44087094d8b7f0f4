//! ASCII plotting for terminal output.
//!
//! One fixed-size panel per country, cohort on x and log-rate on y:
//! - predicted female curve: `-`
//! - predicted male curve: `=`
//! - observed points: `f` (female), `m` (male)
//! - threshold cohort: `|` column (drawn under everything else)
//!
//! Output is deterministic, which keeps golden tests simple.

use crate::domain::Sex;
use crate::fit::PredictedVsObserved;

/// Render one panel per country present in `rows`, in first-seen order.
pub fn render_ascii_panels(
    rows: &[PredictedVsObserved],
    threshold_year: i32,
    width: usize,
    height: usize,
) -> String {
    let mut countries: Vec<&str> = Vec::new();
    for r in rows {
        if !countries.contains(&r.key.code.as_str()) {
            countries.push(&r.key.code);
        }
    }

    let mut out = String::new();
    for code in countries {
        let panel: Vec<&PredictedVsObserved> = rows.iter().filter(|r| r.key.code == code).collect();
        out.push_str(&render_panel(code, &panel, threshold_year, width, height));
    }
    out
}

fn render_panel(
    code: &str,
    rows: &[&PredictedVsObserved],
    threshold_year: i32,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((c_min, c_max)) = cohort_range(rows) else {
        return format!("{code}: not enough cohorts to plot\n");
    };
    let (y_min, y_max) = y_range(rows).unwrap_or((-7.0, -3.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    if (c_min..=c_max).contains(&threshold_year) {
        let x = map_x(threshold_year as f64, c_min as f64, c_max as f64, width);
        for row in grid.iter_mut() {
            row[x] = '|';
        }
    }

    for (sex, ch) in [(Sex::Female, '-'), (Sex::Male, '=')] {
        let curve: Vec<(f64, f64)> = rows
            .iter()
            .filter(|r| r.key.sex == sex)
            .map(|r| (r.key.cohort as f64, r.prediction.log_rate))
            .collect();
        draw_curve(&mut grid, &curve, c_min as f64, c_max as f64, y_min, y_max, ch);
    }

    for r in rows {
        let Some(obs) = r.observed_rate.filter(|v| *v > 0.0) else {
            continue;
        };
        let x = map_x(r.key.cohort as f64, c_min as f64, c_max as f64, width);
        let y = map_y(obs.ln(), y_min, y_max, height);
        grid[y][x] = match r.key.sex {
            Sex::Male => 'm',
            _ => 'f',
        };
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{code}: cohort=[{c_min}, {c_max}] | rate=[{:.2}, {:.2}] per 1000\n",
        y_min.exp() * 1000.0,
        y_max.exp() * 1000.0
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn cohort_range(rows: &[&PredictedVsObserved]) -> Option<(i32, i32)> {
    let min = rows.iter().map(|r| r.key.cohort).min()?;
    let max = rows.iter().map(|r| r.key.cohort).max()?;
    (max > min).then_some((min, max))
}

fn y_range(rows: &[&PredictedVsObserved]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for r in rows {
        min_y = min_y.min(r.prediction.log_rate);
        max_y = max_y.max(r.prediction.log_rate);
        if let Some(obs) = r.observed_rate.filter(|v| *v > 0.0) {
            min_y = min_y.min(obs.ln());
            max_y = max_y.max(obs.ln());
        }
    }

    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(
    grid: &mut [Vec<char>],
    curve: &[(f64, f64)],
    t_min: f64,
    t_max: f64,
    y_min: f64,
    y_max: f64,
    ch: char,
) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, ch),
            None => grid[yy][x] = ch,
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish). Only blank and `|` cells are overwritten.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            let cell = &mut grid[y0 as usize][x0 as usize];
            if *cell == ' ' || *cell == '|' {
                *cell = ch;
            }
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CovariateScheme, RecordKey};
    use crate::fit::PredictionRecord;
    use crate::prep::derive;

    fn cell(code: &str, cohort: i32, sex: Sex, log_pred: f64, obs: Option<f64>) -> PredictedVsObserved {
        let scheme = CovariateScheme {
            origin_year: 2000,
            threshold_year: 2005,
        };
        PredictedVsObserved {
            key: RecordKey::new(code, cohort, sex),
            prediction: PredictionRecord {
                covariates: derive(code, sex, cohort, &scheme),
                log_rate: log_pred,
                rate: log_pred.exp(),
            },
            observed_rate: obs,
        }
    }

    #[test]
    fn panel_golden_snapshot_small() {
        // Flat female curve at -5, one observation at the top of the range.
        let rows = vec![
            cell("SWE", 2000, Sex::Female, -5.0, Some((-5.0f64).exp())),
            cell("SWE", 2009, Sex::Female, -5.0, Some((-4.0f64).exp())),
        ];
        let txt = render_ascii_panels(&rows, 2100, 10, 5);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("SWE: cohort=[2000, 2009]"));
        assert_eq!(lines[1], "         f");
        assert_eq!(lines[2], "          ");
        assert_eq!(lines[3], "          ");
        assert_eq!(lines[4], "          ");
        assert_eq!(lines[5], "f---------");
    }

    #[test]
    fn one_panel_per_country_with_threshold_marker() {
        let mut rows = Vec::new();
        for code in ["SWE", "NOR"] {
            for cohort in 2000..2010 {
                rows.push(cell(code, cohort, Sex::Female, -5.0 - 0.01 * cohort as f64, None));
                rows.push(cell(code, cohort, Sex::Male, -4.8 - 0.01 * cohort as f64, None));
            }
        }
        let txt = render_ascii_panels(&rows, 2005, 20, 6);
        assert!(txt.contains("SWE: cohort"));
        assert!(txt.contains("NOR: cohort"));
        assert!(txt.contains('='));
        assert!(txt.contains('|'));
        assert!(txt.find("SWE").unwrap() < txt.find("NOR").unwrap());
    }

    #[test]
    fn single_cohort_is_reported_not_drawn() {
        let rows = vec![cell("DNK", 2000, Sex::Female, -5.0, None)];
        assert_eq!(render_ascii_panels(&rows, 2005, 20, 6), "DNK: not enough cohorts to plot\n");
    }
}
