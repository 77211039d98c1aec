use super::template::MODELING_MARKER;

/// Reduces a raw completion to the modeling prompt.
///
/// Drops everything through the first marker (when present), strips the
/// leading run of `-`, `:` and whitespace, trims and cuts at the first blank
/// line.
/// Never fails; any length limit is left to the instruction template.
pub fn extract_modeling_prompt(raw: &str) -> String {
    let after_marker = match raw.find(MODELING_MARKER) {
        Some(idx) => &raw[idx + MODELING_MARKER.len()..],
        None => raw,
    };
    let stripped = after_marker
        .trim_start_matches(|c: char| c == '-' || c == ':' || c.is_whitespace())
        .trim();
    let prompt = match stripped.find("\n\n") {
        Some(idx) => &stripped[..idx],
        None => stripped,
    };
    prompt.to_string()
}

#[cfg(test)]
mod tests {
    use super::extract_modeling_prompt;

    #[test]
    fn marker_and_trailer_are_removed() {
        assert_eq!(
            extract_modeling_prompt("noise STARTING 3D MODELING - : A red chair.\n\nignored"),
            "A red chair."
        );
    }

    #[test]
    fn no_marker_still_strips_and_truncates() {
        assert_eq!(
            extract_modeling_prompt("-: A blue table.\n\ntrailer"),
            "A blue table."
        );
    }

    #[test]
    fn no_double_break_returns_full_text() {
        assert_eq!(
            extract_modeling_prompt("  STARTING 3D MODELING:\nA lamp\nwith a brass base  "),
            "A lamp\nwith a brass base"
        );
    }

    #[test]
    fn empty_and_fully_consumed_inputs_yield_empty() {
        assert_eq!(extract_modeling_prompt(""), "");
        assert_eq!(extract_modeling_prompt("STARTING 3D MODELING"), "");
        assert_eq!(extract_modeling_prompt("  -:-:  "), "");
        assert_eq!(extract_modeling_prompt("\n\nrest"), "rest");
    }

    #[test]
    fn marker_is_case_sensitive() {
        assert_eq!(
            extract_modeling_prompt("starting 3d modeling a boat"),
            "starting 3d modeling a boat"
        );
    }

    #[test]
    fn separator_run_is_stripped_but_other_punctuation_kept() {
        assert_eq!(extract_modeling_prompt("STARTING 3D MODELING * a cup"), "* a cup");
        assert_eq!(
            extract_modeling_prompt("STARTING 3D MODELING -- :: - x"),
            "x"
        );
        assert_eq!(
            extract_modeling_prompt("STARTING 3D MODELING - * a mug"),
            "* a mug"
        );
    }

    #[test]
    fn only_first_marker_is_consumed() {
        assert_eq!(
            extract_modeling_prompt("STARTING 3D MODELING a STARTING 3D MODELING b"),
            "a STARTING 3D MODELING b"
        );
    }

    #[test]
    fn extraction_is_deterministic() {
        let raw = "Sure! STARTING 3D MODELING: A sleek robot.\n\nNotes follow.";
        assert_eq!(extract_modeling_prompt(raw), extract_modeling_prompt(raw));
    }
}
