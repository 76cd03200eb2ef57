// Writing the analysis report: one JSON document plus flat CSV tables.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use gridiron_core::data::TeamRecord;
use gridiron_core::summary::{
    GroupStats, PositionSummary, TeamPositionSummary, TeamSummary, WideTeamTable,
};
use gridiron_core::stats::tukey::TukeyComparison;

use crate::analysis::AnalysisReport;

pub const REPORT_JSON: &str = "report.json";
pub const POSITION_SUMMARY_CSV: &str = "position_summary.csv";
pub const TEAM_SUMMARY_CSV: &str = "team_summary.csv";
pub const TEAM_POSITION_SUMMARY_CSV: &str = "team_position_summary.csv";
pub const TEAM_POSITION_WIDE_CSV: &str = "team_position_wide.csv";

const STATS_HEADER: [&str; 4] = ["count", "mean_height", "mean_weight", "mean_bmi"];
const RECORD_HEADER: [&str; 5] = ["season", "games", "wins", "losses", "win_percentage"];

pub fn tukey_file_name(metric: &str) -> String {
    format!("tukey_{metric}.csv")
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

/// Missing values are written as empty cells.
fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn stats_cells(stats: &GroupStats) -> [String; 4] {
    [
        stats.count.to_string(),
        cell(stats.mean_height),
        cell(stats.mean_weight),
        cell(stats.mean_bmi),
    ]
}

fn record_cells(record: &TeamRecord) -> [String; 5] {
    [
        record.season.map(|s| s.to_string()).unwrap_or_default(),
        record.games.to_string(),
        record.wins.to_string(),
        record.losses.to_string(),
        record.win_percentage.to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Table writers
// ---------------------------------------------------------------------------

pub fn write_position_summary<W: io::Write>(out: W, rows: &[PositionSummary]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(std::iter::once("position").chain(STATS_HEADER))?;
    for row in rows {
        writer.write_record(
            std::iter::once(row.position.code().to_string()).chain(stats_cells(&row.stats)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_team_summary<W: io::Write>(out: W, rows: &[TeamSummary]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(
        std::iter::once("team")
            .chain(STATS_HEADER)
            .chain(RECORD_HEADER),
    )?;
    for row in rows {
        writer.write_record(
            std::iter::once(row.group.team.clone())
                .chain(stats_cells(&row.group.stats))
                .chain(record_cells(&row.record)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_team_position_summary<W: io::Write>(
    out: W,
    rows: &[TeamPositionSummary],
) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(
        ["team", "position"]
            .into_iter()
            .chain(STATS_HEADER)
            .chain(RECORD_HEADER),
    )?;
    for row in rows {
        writer.write_record(
            [row.group.team.clone(), row.group.position.code().to_string()]
                .into_iter()
                .chain(stats_cells(&row.group.stats))
                .chain(record_cells(&row.record)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per team: every `<metric>_<POS>` column, then the record.
pub fn write_wide<W: io::Write>(out: W, table: &WideTeamTable) -> csv::Result<()> {
    let columns = table.column_names();
    let mut header = vec!["team".to_string()];
    header.extend(columns.iter().cloned());
    header.extend(RECORD_HEADER.iter().map(|h| h.to_string()));

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;
    for row in &table.rows {
        writer.write_record(
            std::iter::once(row.team.clone())
                .chain(columns.iter().map(|c| cell(row.value(c))))
                .chain(record_cells(&row.record)),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_tukey<W: io::Write>(out: W, rows: &[TukeyComparison]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["comparison", "diff", "lwr", "upr", "p_adj"])?;
    for row in rows {
        writer.write_record([
            row.comparison.clone(),
            row.diff.to_string(),
            row.lwr.to_string(),
            row.upr.to_string(),
            row.p_adj.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Output directory
// ---------------------------------------------------------------------------

fn write_csv_file<F>(dir: &Path, name: &str, write: F) -> anyhow::Result<PathBuf>
where
    F: FnOnce(std::fs::File) -> csv::Result<()>,
{
    let path = dir.join(name);
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write(file).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Write `report.json` and every CSV table into `dir`, creating it if needed.
/// Returns the files written.
pub fn write_report(report: &AnalysisReport, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut written = Vec::new();

    let json_path = dir.join(REPORT_JSON);
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    written.push(json_path);

    written.push(write_csv_file(dir, POSITION_SUMMARY_CSV, |f| {
        write_position_summary(f, &report.position_summary)
    })?);
    written.push(write_csv_file(dir, TEAM_SUMMARY_CSV, |f| {
        write_team_summary(f, &report.team_summary)
    })?);
    written.push(write_csv_file(dir, TEAM_POSITION_SUMMARY_CSV, |f| {
        write_team_position_summary(f, &report.team_position_summary)
    })?);
    written.push(write_csv_file(dir, TEAM_POSITION_WIDE_CSV, |f| {
        write_wide(f, &report.team_position_wide)
    })?);

    for anova in report.anova.iter().filter(|a| a.table.is_some()) {
        let name = tukey_file_name(anova.metric.name());
        written.push(write_csv_file(dir, &name, |f| write_tukey(f, &anova.tukey))?);
    }

    info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridiron_core::data::position::PositionGroup;
    use gridiron_core::summary::{Joined, TeamGroup, WideTeamRow};
    use std::collections::BTreeMap;

    fn stats(count: usize, weight: Option<f64>) -> GroupStats {
        GroupStats {
            mean_height: Some(75.0),
            mean_weight: weight,
            mean_bmi: None,
            count,
        }
    }

    fn record(team: &str) -> TeamRecord {
        TeamRecord {
            team: team.into(),
            season: Some(2023),
            games: 12,
            wins: 9,
            losses: 3,
            win_percentage: 0.75,
        }
    }

    fn written(f: impl FnOnce(&mut Vec<u8>) -> csv::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn position_summary_uses_codes_and_blank_missing() {
        let rows = vec![PositionSummary {
            position: PositionGroup::OffensiveLine,
            stats: stats(3, None),
        }];
        let text = written(|buf| write_position_summary(buf, &rows));
        assert_eq!(
            text,
            "position,count,mean_height,mean_weight,mean_bmi\nOL,3,75,,\n"
        );
    }

    #[test]
    fn team_summary_carries_record() {
        let rows = vec![Joined {
            group: TeamGroup {
                team: "Navy".into(),
                stats: stats(2, Some(250.5)),
            },
            record: record("Navy"),
        }];
        let text = written(|buf| write_team_summary(buf, &rows));
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("team,count,mean_height,mean_weight,mean_bmi,season,games,wins,losses,win_percentage")
        );
        assert_eq!(lines.next(), Some("Navy,2,75,250.5,,2023,12,9,3,0.75"));
    }

    #[test]
    fn wide_table_columns_are_metric_major() {
        let values: BTreeMap<String, Option<f64>> = [
            ("height_QB", Some(76.0)),
            ("height_K", None),
            ("weight_QB", Some(220.0)),
            ("weight_K", Some(190.0)),
            ("bmi_QB", Some(26.8)),
            ("bmi_K", None),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let table = WideTeamTable {
            positions: vec![PositionGroup::Quarterback, PositionGroup::Kicker],
            rows: vec![WideTeamRow {
                team: "Utah".into(),
                values,
                record: record("Utah"),
            }],
        };
        let text = written(|buf| write_wide(buf, &table));
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("team,height_QB,height_K,weight_QB,weight_K,bmi_QB,bmi_K,season,games,wins,losses,win_percentage")
        );
        assert_eq!(lines.next(), Some("Utah,76,,220,190,26.8,,2023,12,9,3,0.75"));
    }

    #[test]
    fn tukey_rows_in_given_order() {
        let rows = vec![
            TukeyComparison {
                comparison: "b-a".into(),
                diff: 1.5,
                lwr: -0.5,
                upr: 3.5,
                p_adj: 0.2,
            },
            TukeyComparison {
                comparison: "c-a".into(),
                diff: 5.0,
                lwr: 3.0,
                upr: 7.0,
                p_adj: 0.001,
            },
        ];
        let text = written(|buf| write_tukey(buf, &rows));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "comparison,diff,lwr,upr,p_adj");
        assert_eq!(lines[1], "b-a,1.5,-0.5,3.5,0.2");
        assert_eq!(lines[2], "c-a,5,3,7,0.001");
    }
}
