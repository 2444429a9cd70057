//! Filter engine (§4.5): generic metadata filters → format-specific filters
//! → pattern filters → post-processing, short-circuiting on first reject.
//! Grounded on `original_source/plugins/rpm/filters.py`, generalized across
//! formats via the [`Filterable`] trait (the Python version re-implements
//! roughly this logic per-plugin; this crate shares one engine).

use std::collections::HashMap;

use regex::Regex;

use crate::config::{FiltersConfig, PatternFilters};

/// The subset of a parsed record's fields the filter engine needs to see.
/// Implemented once per format's record type in `formats/*/parsers.rs`.
pub trait Filterable {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn release(&self) -> &str {
        ""
    }
    fn epoch(&self) -> &str {
        ""
    }
    fn arch(&self) -> Option<&str> {
        None
    }
    fn size_bytes(&self) -> u64 {
        0
    }
    fn build_time(&self) -> Option<i64> {
        None
    }
    fn group(&self) -> Option<&str> {
        None
    }
    fn license(&self) -> Option<&str> {
        None
    }
    fn vendor(&self) -> Option<&str> {
        None
    }
    fn is_source(&self) -> bool {
        false
    }
    fn component(&self) -> Option<&str> {
        None
    }
    fn priority(&self) -> Option<&str> {
        None
    }
}

fn check_list_filter(value: &str, include: &[String], exclude: &[String]) -> bool {
    if !include.is_empty() && !include.iter().any(|v| v == value) {
        return false;
    }
    if exclude.iter().any(|v| v == value) {
        return false;
    }
    true
}

fn check_generic_metadata<T: Filterable>(pkg: &T, filters: &FiltersConfig) -> bool {
    if let Some(min) = filters.min_size {
        if pkg.size_bytes() < min {
            return false;
        }
    }
    if let Some(max) = filters.max_size {
        if pkg.size_bytes() > max {
            return false;
        }
    }
    if let Some(build_time) = pkg.build_time() {
        if let Some(newer_than) = &filters.newer_than {
            if let Ok(threshold) = parse_unix_timestamp(newer_than) {
                if build_time < threshold {
                    return false;
                }
            }
        }
        if let Some(older_than) = &filters.older_than {
            if let Ok(threshold) = parse_unix_timestamp(older_than) {
                if build_time > threshold {
                    return false;
                }
            }
        }
        if let Some(last_n_days) = filters.last_n_days {
            let cutoff = now_unix() - (last_n_days as i64) * 86400;
            if build_time < cutoff {
                return false;
            }
        }
    }
    if let Some(arch_filter) = &filters.architecture {
        if let Some(arch) = pkg.arch() {
            if !check_list_filter(arch, &arch_filter.include, &arch_filter.exclude) {
                return false;
            }
        }
    }
    true
}

/// Parses an ISO-8601 date (`YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`) into a
/// unix timestamp. Only the calendar arithmetic needed for day-granularity
/// filter comparisons; not a general ISO-8601 parser.
fn parse_unix_timestamp(iso: &str) -> Result<i64, ()> {
    let date_part = iso.split('T').next().unwrap_or(iso);
    let mut parts = date_part.splitn(3, '-');
    let year: i64 = parts.next().ok_or(())?.parse().map_err(|_| ())?;
    let month: i64 = parts.next().ok_or(())?.parse().map_err(|_| ())?;
    let day: i64 = parts.next().ok_or(())?.parse().map_err(|_| ())?;
    Ok(days_from_civil(year, month, day) * 86400)
}

/// Howard Hinnant's days-from-civil algorithm, days since the Unix epoch.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn check_rpm_filters<T: Filterable>(pkg: &T, filters: &crate::config::RpmFilters) -> bool {
    if filters.drop_source_rpms && pkg.is_source() {
        return false;
    }
    if let Some(groups) = &filters.group {
        if let Some(group) = pkg.group() {
            if !check_list_filter(group, groups, &[]) {
                return false;
            }
        }
    }
    if let Some(licenses) = &filters.license {
        if let Some(license) = pkg.license() {
            if !check_list_filter(license, licenses, &[]) {
                return false;
            }
        }
    }
    if let Some(vendors) = &filters.vendor {
        if let Some(vendor) = pkg.vendor() {
            if !check_list_filter(vendor, vendors, &[]) {
                return false;
            }
        }
    }
    if let Some(epochs) = &filters.epoch {
        if !pkg.epoch().is_empty() && !check_list_filter(pkg.epoch(), epochs, &[]) {
            return false;
        }
    }
    true
}

fn check_deb_filters<T: Filterable>(pkg: &T, filters: &crate::config::DebFilters) -> bool {
    if let Some(components) = &filters.component {
        if let Some(component) = pkg.component() {
            if !check_list_filter(component, components, &[]) {
                return false;
            }
        }
    }
    if let Some(priorities) = &filters.priority {
        if let Some(priority) = pkg.priority() {
            if !check_list_filter(priority, priorities, &[]) {
                return false;
            }
        }
    }
    true
}

fn check_pattern_filters<T: Filterable>(pkg: &T, patterns: &PatternFilters) -> bool {
    let full_name = format!(
        "{}-{}-{}.{}",
        pkg.name(),
        pkg.version(),
        pkg.release(),
        pkg.arch().unwrap_or("")
    );
    let matches = |pattern: &str| {
        Regex::new(pattern)
            .map(|re| re.is_match(pkg.name()) || re.is_match(&full_name))
            .unwrap_or(false)
    };
    if !patterns.include.is_empty() && !patterns.include.iter().any(|p| matches(p)) {
        return false;
    }
    if patterns.exclude.iter().any(|p| matches(p)) {
        return false;
    }
    true
}

/// RPM-shaped `(epoch, version, release)` ordering. Version segments are
/// split on non-alphanumeric boundaries and compared numerically when both
/// sides parse as integers, lexicographically otherwise — a pragmatic RPM
/// version comparator, not a full NEVRA implementation (§4.5 "Parsing
/// failures fall back to lexicographic comparison").
pub fn compare_versions(a: (&str, &str, &str), b: (&str, &str, &str)) -> std::cmp::Ordering {
    let epoch_a: i64 = a.0.parse().unwrap_or(0);
    let epoch_b: i64 = b.0.parse().unwrap_or(0);
    epoch_a
        .cmp(&epoch_b)
        .then_with(|| compare_version_strings(a.1, b.1))
        .then_with(|| a.2.cmp(b.2))
}

fn split_segments(v: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_is_digit: Option<bool> = None;
    for c in v.chars() {
        let is_digit = c.is_ascii_digit();
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            current_is_digit = None;
            continue;
        }
        if current_is_digit.is_some() && current_is_digit != Some(is_digit) {
            segments.push(std::mem::take(&mut current));
        }
        current.push(c);
        current_is_digit = Some(is_digit);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn compare_version_strings(a: &str, b: &str) -> std::cmp::Ordering {
    let sa = split_segments(a);
    let sb = split_segments(b);
    for pair in sa.iter().zip(sb.iter()) {
        let (x, y) = pair;
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    sa.len().cmp(&sb.len())
}

/// Groups `packages` by `(name, arch)` and keeps only the `n` with the
/// highest `(epoch, version, release)`.
fn keep_only_latest_versions<T: Filterable + Clone>(packages: Vec<T>, n: usize) -> Vec<T> {
    let mut grouped: HashMap<(String, String), Vec<T>> = HashMap::new();
    for pkg in packages {
        let key = (pkg.name().to_string(), pkg.arch().unwrap_or("").to_string());
        grouped.entry(key).or_default().push(pkg);
    }
    let mut result = Vec::new();
    for (_key, mut group) in grouped {
        group.sort_by(|a, b| {
            compare_versions(
                (a.epoch(), a.version(), a.release()),
                (b.epoch(), b.version(), b.release()),
            )
            .reverse()
        });
        result.extend(group.into_iter().take(n));
    }
    result
}

/// Applies the full §4.5 evaluation order to `packages`, returning only the
/// surviving records.
pub fn apply_filters<T: Filterable + Clone>(packages: Vec<T>, filters: &FiltersConfig) -> Vec<T> {
    let mut filtered: Vec<T> = packages
        .into_iter()
        .filter(|pkg| {
            if !check_generic_metadata(pkg, filters) {
                return false;
            }
            if let Some(rpm_filters) = &filters.rpm {
                if !check_rpm_filters(pkg, rpm_filters) {
                    return false;
                }
            }
            if let Some(deb_filters) = &filters.deb {
                if !check_deb_filters(pkg, deb_filters) {
                    return false;
                }
            }
            if let Some(patterns) = &filters.patterns {
                if !check_pattern_filters(pkg, patterns) {
                    return false;
                }
            }
            true
        })
        .collect();

    if let Some(post) = &filters.post_processing {
        if post.only_latest_version {
            filtered = keep_only_latest_versions(filtered, 1);
        } else if let Some(n) = post.only_latest_n_versions {
            filtered = keep_only_latest_versions(filtered, n);
        }
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Pkg {
        name: String,
        version: String,
        release: String,
        arch: String,
        is_source: bool,
    }

    impl Filterable for Pkg {
        fn name(&self) -> &str {
            &self.name
        }
        fn version(&self) -> &str {
            &self.version
        }
        fn release(&self) -> &str {
            &self.release
        }
        fn arch(&self) -> Option<&str> {
            Some(&self.arch)
        }
        fn is_source(&self) -> bool {
            self.is_source
        }
    }

    fn pkg(name: &str, version: &str, release: &str, arch: &str) -> Pkg {
        Pkg {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            is_source: arch == "src",
        }
    }

    #[test]
    fn drop_source_rpms_filters_src_arch() {
        let packages = vec![pkg("httpd", "2.4.57", "5.el9", "x86_64"), pkg("httpd", "2.4.57", "5.el9", "src")];
        let filters = FiltersConfig {
            rpm: Some(crate::config::RpmFilters {
                drop_source_rpms: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = apply_filters(packages, &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].arch(), Some("x86_64"));
    }

    #[test]
    fn keeps_only_latest_version_per_name_arch() {
        let packages = vec![
            pkg("foo", "1.0", "1", "x86_64"),
            pkg("foo", "2.0", "1", "x86_64"),
            pkg("foo", "1.5", "1", "x86_64"),
        ];
        let filters = FiltersConfig {
            post_processing: Some(crate::config::PostProcessingFilters {
                only_latest_version: true,
                only_latest_n_versions: None,
            }),
            ..Default::default()
        };
        let result = apply_filters(packages, &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].version(), "2.0");
    }

    #[test]
    fn pattern_include_requires_a_match() {
        let packages = vec![pkg("httpd", "2.4.57", "5.el9", "x86_64"), pkg("vim", "9.0", "1.el9", "x86_64")];
        let filters = FiltersConfig {
            patterns: Some(PatternFilters {
                include: vec!["^httpd$".to_string()],
                exclude: vec![],
            }),
            ..Default::default()
        };
        let result = apply_filters(packages, &filters);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name(), "httpd");
    }

    #[test]
    fn version_compare_orders_numeric_segments_not_lexicographically() {
        assert_eq!(
            compare_versions(("0", "2", "1"), ("0", "10", "1")),
            std::cmp::Ordering::Less
        );
    }
}
