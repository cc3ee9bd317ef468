use std::io::{self, Write};

use anyhow::Result;

use crate::util::truncate_with_ellipsis;
use crate::validation::{BatchStats, ValidationResult, format_percent};

const DETAIL_CLAIM_CHARS: usize = 70;

pub fn write_summary(title: &str, summary: &BatchStats) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    write_summary_to(&mut output, title, summary)?;
    output.flush()?;
    Ok(())
}

pub fn write_summary_to(output: &mut impl Write, title: &str, summary: &BatchStats) -> Result<()> {
    writeln!(output, "{title}")?;
    writeln!(
        output,
        "Facts: total={} valid={} invalid={} recovered={} rate={}",
        summary.total_facts,
        summary.valid_facts,
        summary.invalid_facts,
        summary.recovered_facts,
        format_percent(summary.validation_rate),
    )?;

    if !summary.by_status.is_empty() {
        let breakdown = summary
            .by_status
            .iter()
            .map(|(status, count)| format!("{status}={count}"))
            .collect::<Vec<String>>()
            .join(" ");
        writeln!(output, "Status: {breakdown}")?;
    }

    Ok(())
}

pub fn write_results(results: &[ValidationResult], show_invalid_only: bool) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    write_results_to(&mut output, results, show_invalid_only)?;
    output.flush()?;
    Ok(())
}

pub fn write_results_to(
    output: &mut impl Write,
    results: &[ValidationResult],
    show_invalid_only: bool,
) -> Result<()> {
    for result in results
        .iter()
        .filter(|result| !show_invalid_only || !result.is_valid)
    {
        writeln!(
            output,
            "{}.\t{}\t{}\t{}",
            result.fact_index + 1,
            result.status.as_str(),
            result.actual_line_range,
            truncate_with_ellipsis(&result.claim, DETAIL_CLAIM_CHARS),
        )?;

        if !result.error_message.is_empty() {
            writeln!(output, "\terror: {}", result.error_message)?;
        } else if let Some(corrected) = &result.corrected_quote {
            writeln!(
                output,
                "\tcorrected: \"{}\"",
                truncate_with_ellipsis(corrected, DETAIL_CLAIM_CHARS)
            )?;
        } else if !result.quote_snippet.is_empty() {
            writeln!(output, "\tquote: \"{}\"", result.quote_snippet)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn summary_lists_counts_and_status_breakdown() {
        let summary = BatchStats {
            total_facts: 4,
            valid_facts: 3,
            invalid_facts: 1,
            validation_rate: 0.75,
            recovered_facts: 1,
            by_status: BTreeMap::from([
                ("recovered".to_string(), 1),
                ("rejected".to_string(), 1),
                ("valid_exact".to_string(), 2),
            ]),
        };

        let mut buffer = Vec::new();
        write_summary_to(&mut buffer, "Validation: soc2.txt", &summary).expect("write summary");
        let text = String::from_utf8(buffer).expect("utf8");

        assert!(text.starts_with("Validation: soc2.txt\n"));
        assert!(text.contains("total=4 valid=3 invalid=1 recovered=1 rate=75%"));
        assert!(text.contains("Status: recovered=1 rejected=1 valid_exact=2"));
    }
}
