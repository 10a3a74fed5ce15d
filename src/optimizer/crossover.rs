use crate::error::{EvResult, EvolveError};
use crate::genome::Genome;
use fastrand::Rng;

/// Single-point crossover at a random point in `[1, len - 1]`.
///
/// Parents shorter than two symbols have no valid point and pass through
/// unchanged. Parents of different lengths are rejected.
pub fn crossover(mother: &Genome, father: &Genome, rng: &mut Rng) -> EvResult<(Genome, Genome)> {
    let len = mother.len();
    if len != father.len() {
        return Err(EvolveError::InvalidJob(format!(
            "Parents must have same length, got {} and {}",
            len,
            father.len()
        )));
    }

    if len < 2 {
        return Ok((mother.clone(), father.clone()));
    }

    Ok(crossover_at(mother, father, rng.usize(1..len)))
}

/// `child1 = mother[..point] + father[point..]`, `child2 = father[..point] + mother[point..]`.
pub fn crossover_at(mother: &Genome, father: &Genome, point: usize) -> (Genome, Genome) {
    let (m_head, m_tail) = mother.text().split_at(point);
    let (f_head, f_tail) = father.text().split_at(point);

    let child1 = mother.with_text([m_head, f_tail].concat());
    let child2 = father.with_text([f_head, m_tail].concat());

    (child1, child2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Target;
    use fastrand::Rng;
    use proptest::prelude::*;

    #[test]
    fn test_crossover_at_point() {
        let target = Target::new("abcdef");
        let mother = Genome::from_text("AAAAAA", &target).unwrap();
        let father = Genome::from_text("BBBBBB", &target).unwrap();

        let (c1, c2) = crossover_at(&mother, &father, 2);
        assert_eq!(c1.text_string(), "AABBBB");
        assert_eq!(c2.text_string(), "BBAAAA");
        assert_eq!(c1.fitness(), 6);
    }

    #[test]
    fn test_short_parents_pass_through() {
        let target = Target::new("a");
        let mother = Genome::from_text("x", &target).unwrap();
        let father = Genome::from_text("a", &target).unwrap();
        let mut rng = Rng::with_seed(3);

        let (c1, c2) = crossover(&mother, &father, &mut rng).unwrap();
        assert_eq!(c1, mother);
        assert_eq!(c2, father);
    }

    #[test]
    fn test_mismatched_parents_are_rejected() {
        let mother = Genome::from_text("abc", &Target::new("abc")).unwrap();
        let father = Genome::from_text("ab", &Target::new("ab")).unwrap();
        let mut rng = Rng::with_seed(5);

        let err = crossover(&mother, &father, &mut rng).unwrap_err();
        assert!(matches!(err, EvolveError::InvalidJob(_)));
    }

    proptest! {
        #[test]
        fn prop_children_keep_length_and_genes(
            seed in any::<u64>(),
            len in 2usize..64
        ) {
            let target = Target::new(&"t".repeat(len));
            let mother = Genome::from_text(&"m".repeat(len), &target).unwrap();
            let father = Genome::from_text(&"f".repeat(len), &target).unwrap();
            let mut rng = Rng::with_seed(seed);

            let (c1, c2) = crossover(&mother, &father, &mut rng).unwrap();
            prop_assert_eq!(c1.len(), len);
            prop_assert_eq!(c2.len(), len);

            // Every position is inherited from exactly one parent across the pair.
            for i in 0..len {
                let pair = (c1.text()[i], c2.text()[i]);
                prop_assert!(pair == ('m', 'f') || pair == ('f', 'm'));
            }
        }
    }
}
