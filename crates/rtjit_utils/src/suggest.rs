/// Pick the candidate closest to `target` by edit distance, if any is close
/// enough to be a plausible typo.
pub fn closest_name<I, S>(target: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let limit = if target.chars().count() < 4 { 1 } else { 3 };
    let mut best: Option<(usize, String)> = None;

    for candidate in candidates {
        let candidate = candidate.as_ref();
        if candidate == target {
            continue;
        }
        let distance = edit_distance(target, candidate);
        if distance > limit {
            continue;
        }
        if best.as_ref().is_none_or(|(current, _)| distance < *current) {
            best = Some((distance, candidate.to_string()));
        }
    }

    best.map(|(_, name)| name)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_near_miss() {
        let names = ["process", "init", "destroy"];
        assert_eq!(closest_name("proces", names), Some("process".to_string()));
        assert_eq!(closest_name("procss", names), Some("process".to_string()));
    }

    #[test]
    fn ignores_distant_names() {
        assert_eq!(closest_name("render", ["process", "init"]), None);
    }

    #[test]
    fn distance_counts_edits() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }
}
