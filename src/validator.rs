//! Document validation against a compiled schema
//!
//! Validation walks the element tree against the sequence/attribute model
//! produced by [`crate::schema::compile`] and stops at the first violation.
//! The failure carries a short constraint summary plus a path-qualified
//! detail string; callers attach their own consequence ("Import aborted.",
//! "Export aborted.") when surfacing it.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveTime;
use regex::Regex;

use crate::schema::{
    Builtin, ComplexType, MaxOccurs, Particle, ResolvedType, Schema, SimpleType, Term, TypeRef,
};
use crate::tree::Element;

/// Cached regex for the xs:time lexical form.
static TIME_REGEX: OnceLock<Regex> = OnceLock::new();

fn time_regex() -> &'static Regex {
    TIME_REGEX.get_or_init(|| {
        Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?$").expect("time regex is valid")
    })
}

/// A schema violation: what constraint broke, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Constraint summary without location context.
    pub message: String,
    /// Path-qualified description, e.g. `WeekSchedule/Mon/Zone[1]: ...`.
    pub detail: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail)
    }
}

fn failure(path: &str, message: String) -> ValidationFailure {
    ValidationFailure {
        detail: format!("{path}: {message}"),
        message,
    }
}

/// Validate a document tree against a schema.
pub fn validate(root: &Element, schema: &Schema) -> Result<(), ValidationFailure> {
    let decl = schema.global(&root.tag).ok_or_else(|| {
        failure(
            &root.tag,
            format!("no global declaration for element '{}'", root.tag),
        )
    })?;
    validate_element(root, &decl.type_ref, &root.tag, schema)
}

fn validate_element(
    element: &Element,
    type_ref: &TypeRef,
    path: &str,
    schema: &Schema,
) -> Result<(), ValidationFailure> {
    match type_ref {
        TypeRef::InlineComplex(complex) => validate_complex(element, complex, path, schema),
        TypeRef::Named(name) => match schema.resolve(name) {
            Some(ResolvedType::Simple(simple)) => validate_simple(element, simple, path),
            Some(ResolvedType::Complex(complex)) => {
                validate_complex(element, complex, path, schema)
            }
            // compile() reference-checks, so this cannot happen for a
            // compiled schema; fail rather than panic.
            None => Err(failure(path, format!("unresolved type '{name}'"))),
        },
    }
}

fn validate_simple(
    element: &Element,
    simple: SimpleType,
    path: &str,
) -> Result<(), ValidationFailure> {
    if !element.children.is_empty() {
        return Err(failure(
            path,
            format!("element '{}' must not have child elements", element.tag),
        ));
    }
    if !element.attributes.is_empty() {
        return Err(failure(
            path,
            format!("element '{}' must not have attributes", element.tag),
        ));
    }
    check_value(&element.text, simple).map_err(|reason| failure(path, reason))
}

fn validate_complex(
    element: &Element,
    complex: &ComplexType,
    path: &str,
    schema: &Schema,
) -> Result<(), ValidationFailure> {
    if !element.text.trim().is_empty() {
        return Err(failure(
            path,
            format!("element '{}' must not have character content", element.tag),
        ));
    }

    // Attributes: required present, values well-typed, nothing undeclared.
    for decl in &complex.attributes {
        match element.attr(&decl.name) {
            Some(value) => {
                let simple = match schema.resolve(&decl.type_name) {
                    Some(ResolvedType::Simple(simple)) => simple,
                    _ => {
                        return Err(failure(
                            path,
                            format!("attribute '{}' has unresolved type", decl.name),
                        ));
                    }
                };
                check_value(value, simple).map_err(|reason| {
                    failure(path, format!("attribute '{}': {reason}", decl.name))
                })?;
            }
            None if decl.required => {
                return Err(failure(
                    path,
                    format!("missing required attribute '{}'", decl.name),
                ));
            }
            None => {}
        }
    }
    for (name, _) in &element.attributes {
        if !complex.attributes.iter().any(|decl| &decl.name == name) {
            return Err(failure(path, format!("unexpected attribute '{name}'")));
        }
    }

    // Children against the sequence model, in order, with occurrence
    // bounds.
    let mut index = 0;
    for particle in &complex.sequence {
        let (name, type_ref) = resolve_term(particle, schema, path)?;
        let mut count: u32 = 0;
        while index < element.children.len() && element.children[index].tag == name {
            if !particle.allows_another(count) {
                let limit = match particle.max_occurs {
                    MaxOccurs::Bounded(limit) => limit,
                    MaxOccurs::Unbounded => u32::MAX,
                };
                return Err(failure(
                    path,
                    format!("element '{name}' occurs more than {limit} times"),
                ));
            }
            let child_path = format!("{path}/{name}[{}]", count + 1);
            validate_element(&element.children[index], type_ref, &child_path, schema)?;
            index += 1;
            count += 1;
        }
        if count < particle.min_occurs {
            return Err(failure(path, format!("expected element '{name}'")));
        }
    }
    if index < element.children.len() {
        return Err(failure(
            path,
            format!("unexpected element '{}'", element.children[index].tag),
        ));
    }
    Ok(())
}

fn resolve_term<'a>(
    particle: &'a Particle,
    schema: &'a Schema,
    path: &str,
) -> Result<(&'a str, &'a TypeRef), ValidationFailure> {
    match &particle.term {
        Term::Element(decl) => Ok((decl.name.as_str(), &decl.type_ref)),
        Term::Ref(target) => {
            let decl = schema
                .global(target)
                .ok_or_else(|| failure(path, format!("unresolved element ref '{target}'")))?;
            Ok((decl.name.as_str(), &decl.type_ref))
        }
    }
}

fn check_value(value: &str, simple: SimpleType) -> Result<(), String> {
    let numeric = match simple.base {
        Builtin::String => return Ok(()),
        Builtin::Boolean => {
            return match value {
                "true" | "false" | "1" | "0" => Ok(()),
                other => Err(format!("'{other}' is not a valid boolean")),
            };
        }
        Builtin::Time => {
            if !time_regex().is_match(value)
                || NaiveTime::parse_from_str(value, "%H:%M:%S%.f").is_err()
            {
                return Err(format!("'{value}' is not a valid time"));
            }
            return Ok(());
        }
        Builtin::Integer => value
            .parse::<i64>()
            .map(|n| n as f64)
            .map_err(|_| format!("'{value}' is not a valid integer"))?,
        Builtin::PositiveInteger => {
            let parsed = value
                .parse::<u64>()
                .map_err(|_| format!("'{value}' is not a valid positive integer"))?;
            if parsed == 0 {
                return Err(format!("'{value}' is not a valid positive integer"));
            }
            parsed as f64
        }
        Builtin::Float => value
            .parse::<f64>()
            .map_err(|_| format!("'{value}' is not a valid float"))?,
    };

    if let Some(min) = simple.min_inclusive {
        if numeric < min {
            return Err(format!("value {value} is below the minimum of {min}"));
        }
    }
    if let Some(max) = simple.max_inclusive {
        if numeric > max {
            return Err(format!("value {value} is above the maximum of {max}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compile;
    use crate::tree;

    fn schema() -> Schema {
        let root = tree::parse(include_str!("../assets/week_schedule.xsd")).unwrap();
        compile(&root, "embedded").unwrap()
    }

    fn week_doc(monday: &str) -> String {
        format!(
            "<WeekSchedule><Mon>{monday}</Mon><Tue/><Wed/><Thu/><Fri/><Sat/><Sun/></WeekSchedule>"
        )
    }

    const GOOD_ZONE: &str = r#"<Zone Name="Morning Show" Start="08:00:00">
        <Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main>
    </Zone>"#;

    #[test]
    fn test_conformant_document_passes() {
        let root = tree::parse(&week_doc(GOOD_ZONE)).unwrap();
        assert!(validate(&root, &schema()).is_ok());
    }

    #[test]
    fn test_empty_days_are_valid() {
        let root = tree::parse(&week_doc("")).unwrap();
        assert!(validate(&root, &schema()).is_ok());
    }

    #[test]
    fn test_missing_start_attribute_rejected() {
        let zone = r#"<Zone Name="Morning Show">
            <Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main>
        </Zone>"#;
        let root = tree::parse(&week_doc(zone)).unwrap();
        let err = validate(&root, &schema()).unwrap_err();
        assert!(!err.detail.is_empty());
        assert!(err.detail.contains("Start"));
    }

    #[test]
    fn test_five_intermediates_rejected() {
        let intermediates: String = (1..=5)
            .map(|i| {
                format!(
                    r#"<Intermediate Name="spots{i}"><Path>/x/spots{i}.m3u</Path><Shuffle>false</Shuffle><SchedIntervalMins>30</SchedIntervalMins><NumSchedItems>1</NumSchedItems></Intermediate>"#
                )
            })
            .collect();
        let zone = format!(
            r#"<Zone Name="Morning Show" Start="08:00:00"><Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main>{intermediates}</Zone>"#
        );
        let root = tree::parse(&week_doc(&zone)).unwrap();
        let err = validate(&root, &schema()).unwrap_err();
        assert!(err.detail.contains("Intermediate"));
    }

    #[test]
    fn test_four_intermediates_accepted() {
        let intermediates: String = (1..=4)
            .map(|i| {
                format!(
                    r#"<Intermediate Name="spots{i}"><Path>/x/spots{i}.m3u</Path><Shuffle>false</Shuffle><SchedIntervalMins>30</SchedIntervalMins><NumSchedItems>1</NumSchedItems></Intermediate>"#
                )
            })
            .collect();
        let zone = format!(
            r#"<Zone Name="Morning Show" Start="08:00:00"><Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main>{intermediates}</Zone>"#
        );
        let root = tree::parse(&week_doc(&zone)).unwrap();
        assert!(validate(&root, &schema()).is_ok());
    }

    #[test]
    fn test_missing_main_rejected() {
        let zone = r#"<Zone Name="Morning Show" Start="08:00:00"/>"#;
        let root = tree::parse(&week_doc(zone)).unwrap();
        let err = validate(&root, &schema()).unwrap_err();
        assert!(err.detail.contains("Main"));
    }

    #[test]
    fn test_bad_time_rejected() {
        let zone = r#"<Zone Name="Morning Show" Start="8am">
            <Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle></Main>
        </Zone>"#;
        let root = tree::parse(&week_doc(zone)).unwrap();
        assert!(validate(&root, &schema()).is_err());
    }

    #[test]
    fn test_fade_facet_out_of_range_rejected() {
        let zone = r#"<Zone Name="Morning Show" Start="08:00:00">
            <Main><Path>/x/jazz.m3u</Path><Shuffle>true</Shuffle>
                <Fader><FadeInDurationSecs>11</FadeInDurationSecs></Fader>
            </Main>
        </Zone>"#;
        let root = tree::parse(&week_doc(zone)).unwrap();
        let err = validate(&root, &schema()).unwrap_err();
        assert!(err.detail.contains("11"));
    }

    #[test]
    fn test_wrong_day_order_rejected() {
        let doc = "<WeekSchedule><Tue/><Mon/><Wed/><Thu/><Fri/><Sat/><Sun/></WeekSchedule>";
        let root = tree::parse(doc).unwrap();
        assert!(validate(&root, &schema()).is_err());
    }

    #[test]
    fn test_unknown_root_rejected() {
        let root = tree::parse("<MonthSchedule/>").unwrap();
        let err = validate(&root, &schema()).unwrap_err();
        assert!(err.detail.contains("MonthSchedule"));
    }

    #[test]
    fn test_check_value_booleans_and_numbers() {
        assert!(check_value("true", SimpleType::of(Builtin::Boolean)).is_ok());
        assert!(check_value("yes", SimpleType::of(Builtin::Boolean)).is_err());
        assert!(check_value("0", SimpleType::of(Builtin::PositiveInteger)).is_err());
        assert!(check_value("3", SimpleType::of(Builtin::PositiveInteger)).is_ok());
        assert!(check_value("23:59:59", SimpleType::of(Builtin::Time)).is_ok());
        assert!(check_value("24:00:01", SimpleType::of(Builtin::Time)).is_err());
    }
}
