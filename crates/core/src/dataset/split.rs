use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::DatasetError;
use crate::domain::listing::Listing;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DescriptionSplit {
    pub train: Vec<Listing>,
    pub test: Vec<Listing>,
}

/// Splits listings into train/test partitions without leaking a description
/// across them.
///
/// Dealers repost the same text for many cars, so rows sharing an identical
/// description are grouped and each group is assigned whole. Groups are
/// shuffled with `seed` and moved into the test partition while they fit
/// under `round(test_fraction * rows)`. Row order is preserved inside each
/// partition.
pub fn split_by_description(
    listings: &[Listing],
    test_fraction: f64,
    seed: u64,
) -> Result<DescriptionSplit, DatasetError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(DatasetError::InvalidFraction(test_fraction));
    }

    let mut group_of: HashMap<&str, usize> = HashMap::new();
    let mut group_sizes: Vec<usize> = Vec::new();
    let assignments: Vec<usize> = listings
        .iter()
        .map(|listing| {
            let next = group_sizes.len();
            let group = *group_of.entry(listing.description.as_str()).or_insert(next);
            if group == next {
                group_sizes.push(0);
            }
            group_sizes[group] += 1;
            group
        })
        .collect();

    let mut order: Vec<usize> = (0..group_sizes.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let target = (test_fraction * listings.len() as f64).round() as usize;
    let mut in_test = vec![false; group_sizes.len()];
    let mut test_rows = 0;
    for group in order {
        if test_rows + group_sizes[group] <= target {
            in_test[group] = true;
            test_rows += group_sizes[group];
        }
        if test_rows == target {
            break;
        }
    }

    let mut split = DescriptionSplit::default();
    for (listing, group) in listings.iter().zip(assignments) {
        if in_test[group] {
            split.test.push(listing.clone());
        } else {
            split.train.push(listing.clone());
        }
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::dataset::fixtures::listing;
    use crate::dataset::split::split_by_description;
    use crate::dataset::DatasetError;
    use crate::domain::listing::Listing;

    fn with_descriptions(count: usize, shared_every: usize) -> Vec<Listing> {
        (0..count)
            .map(|index| {
                let mut row = listing(index as i64, ("honda", "civic", 2015), 40_000, 9_000.0);
                row.description = format!("dealer ad {}", index / shared_every);
                row
            })
            .collect()
    }

    #[test]
    fn no_description_appears_in_both_partitions() {
        let rows = with_descriptions(200, 4);
        let split = split_by_description(&rows, 0.2, 3142).expect("fraction is valid");

        let train: HashSet<&str> = split.train.iter().map(|row| row.description.as_str()).collect();
        let test: HashSet<&str> = split.test.iter().map(|row| row.description.as_str()).collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(split.train.len() + split.test.len(), rows.len());
    }

    #[test]
    fn test_partition_tracks_requested_fraction() {
        let rows = with_descriptions(500, 5);
        let split = split_by_description(&rows, 0.2, 7).expect("fraction is valid");

        let fraction = split.test.len() as f64 / rows.len() as f64;
        assert!((fraction - 0.2).abs() < 0.02, "test fraction was {fraction}");
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let rows = with_descriptions(120, 3);
        let first = split_by_description(&rows, 0.25, 99).expect("fraction is valid");
        let second = split_by_description(&rows, 0.25, 99).expect("fraction is valid");
        assert_eq!(first, second);
    }

    #[test]
    fn empty_descriptions_form_one_group() {
        let mut rows = with_descriptions(40, 1);
        for row in rows.iter_mut().take(10) {
            row.description.clear();
        }
        let split = split_by_description(&rows, 0.3, 5).expect("fraction is valid");
        let blank_in_train = split.train.iter().any(|row| row.description.is_empty());
        let blank_in_test = split.test.iter().any(|row| row.description.is_empty());
        assert!(blank_in_train != blank_in_test);
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let rows = with_descriptions(10, 1);
        assert!(matches!(
            split_by_description(&rows, 1.0, 1),
            Err(DatasetError::InvalidFraction(_))
        ));
        assert!(matches!(
            split_by_description(&rows, 0.0, 1),
            Err(DatasetError::InvalidFraction(_))
        ));
    }
}
