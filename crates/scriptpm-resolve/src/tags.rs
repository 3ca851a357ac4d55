//! Tag filtering

/// Required tags for a request, compared case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    required: Vec<String>,
}

impl TagFilter {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { required }
    }

    /// No required tags: everything passes
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Check whether a candidate carries at least one required tag
    pub fn accepts<S: AsRef<str>>(&self, candidate_tags: &[S]) -> bool {
        self.is_empty()
            || candidate_tags.iter().any(|tag| {
                let tag = tag.as_ref();
                self.required.iter().any(|r| r.eq_ignore_ascii_case(tag))
            })
    }
}

/// Check whether `candidate_tags` intersects `required_tags`, ignoring case
///
/// An empty requirement means "no filtering", not "must have no tags".
pub fn has_any_required_tag<A: AsRef<str>, B: AsRef<str>>(
    candidate_tags: &[A],
    required_tags: &[B],
) -> bool {
    TagFilter::new(required_tags).accepts(candidate_tags)
}
