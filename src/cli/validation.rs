use crate::api::models::CATEGORIES;
use crate::cli::args::{CliArgs, Command, FilterArgs};
use crate::dashboard::StatusFilter;
use crate::output::OutputFormat;

fn validate_filters(filters: &FilterArgs) -> Result<(), String> {
    if let Some(raw) = filters.status.as_deref() {
        StatusFilter::parse(raw)
            .ok_or_else(|| format!("invalid --status '{raw}', expected pending, responded or all"))?;
    }
    if let Some(raw) = filters.category.as_deref() {
        let known = raw.eq_ignore_ascii_case("all") || CATEGORIES.iter().any(|c| c.trim() == raw.trim());
        if !known {
            return Err(format!("unknown --category '{raw}'"));
        }
    }
    Ok(())
}

fn positive(name: &str, value: Option<usize>) -> Result<(), String> {
    match value {
        Some(0) => Err(format!("invalid {name}, expected positive integer")),
        _ => Ok(()),
    }
}

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(raw) = args.output_format.as_deref() {
        OutputFormat::parse(raw)
            .ok_or_else(|| format!("invalid --format '{raw}', expected text or json"))?;
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    positive("workers", args.workers)?;

    match args.command.as_ref() {
        Some(Command::List(list)) => {
            validate_filters(&list.filters)?;
            positive("limit", list.limit)?;
        }
        Some(Command::Prioritize(p)) => validate_filters(&p.filters)?,
        Some(Command::Browse(browse)) => {
            validate_filters(&browse.filters)?;
            positive("page-size", browse.page_size)?;
            positive("rows", browse.viewport_rows)?;
            if let Some(raw) = browse.full_fetch_status.as_deref() {
                crate::utils::parse_full_fetch_status(raw)
                    .map_err(|e| format!("invalid --full-fetch-status '{raw}': {e}"))?;
            }
        }
        Some(Command::Submit(submit)) => {
            if submit.latitude.is_some() != submit.longitude.is_some() {
                return Err("--lat and --lon must be given together".to_string());
            }
            if submit.latitude.is_none() && submit.street.is_none() {
                return Err("give either --street/--number or --lat/--lon".to_string());
            }
        }
        Some(Command::Streets { limit, .. }) => positive("limit", Some(*limit))?,
        _ => {}
    }
    Ok(())
}
