use std::cmp::Ordering;
use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AppError;
use crate::geo::distance_between;
use crate::models::user::GeoPoint;
use crate::store::{Candidate, ContractorDirectory};

/// Picks up to `max_count` eligible contractors for `category_id`, skipping
/// anyone in `excluded`. An empty result means the pool is exhausted.
pub fn select_candidates(
    directory: &dyn ContractorDirectory,
    category_id: Uuid,
    excluded: &HashSet<Uuid>,
    max_count: usize,
    location: Option<&GeoPoint>,
) -> Result<Vec<Uuid>, AppError> {
    if max_count == 0 {
        return Err(AppError::Validation("max_count must be >= 1".to_string()));
    }

    let category = directory
        .category(category_id)?
        .ok_or_else(|| AppError::NotFound(format!("category {category_id} not found")))?;
    if !category.active {
        return Err(AppError::Validation(format!(
            "category {category_id} is not active"
        )));
    }

    let pool: Vec<Candidate> = directory
        .eligible_contractors(category_id)?
        .into_iter()
        .filter(|candidate| !excluded.contains(&candidate.contractor_id))
        .collect();

    Ok(rank_candidates(pool, location)
        .into_iter()
        .take(max_count)
        .map(|candidate| candidate.contractor_id)
        .collect())
}

/// Orders candidates nearest first when `location` is known (contractors
/// without a fix go last), then by rating descending with unrated last, then
/// by id ascending.
pub fn rank_candidates(candidates: Vec<Candidate>, location: Option<&GeoPoint>) -> Vec<Candidate> {
    let mut ranked: Vec<(Option<f64>, Candidate)> = candidates
        .into_iter()
        .map(|candidate| {
            let distance_km = distance_between(location, candidate.location.as_ref());
            (distance_km, candidate)
        })
        .collect();

    ranked.sort_by(|(a_distance, a), (b_distance, b)| {
        compare_nearest(*a_distance, *b_distance)
            .then_with(|| compare_best_rated(a.rating, b.rating))
            .then_with(|| a.contractor_id.cmp(&b.contractor_id))
    });

    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}

fn compare_nearest(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_best_rated(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{rank_candidates, select_candidates};
    use crate::error::AppError;
    use crate::models::user::{Category, GeoPoint, Offering, User, UserRole};
    use crate::store::{Candidate, MemoryStore};

    fn candidate(id_seed: u128, location: Option<(f64, f64)>, rating: Option<f64>) -> Candidate {
        Candidate {
            contractor_id: Uuid::from_u128(id_seed),
            location: location.map(|(lat, lng)| GeoPoint { lat, lng }),
            rating,
        }
    }

    fn ids(ranked: &[Candidate]) -> Vec<u128> {
        ranked.iter().map(|c| c.contractor_id.as_u128()).collect()
    }

    fn seeded_store(contractors: u128) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let category = store.insert_category(Category {
            id: Uuid::new_v4(),
            name: "plumbing".to_string(),
            description: None,
            active: true,
        });

        for seed in 1..=contractors {
            let user = store.insert_user(User {
                id: Uuid::from_u128(seed),
                name: format!("contractor-{seed}"),
                email: format!("c{seed}@example.com"),
                phone: None,
                role: UserRole::Contractor,
                active: true,
                location: None,
                created_at: Utc::now(),
            });
            store.insert_offering(Offering {
                id: Uuid::new_v4(),
                contractor_id: user.id,
                category_id: category.id,
                base_rate: None,
                experience_years: 1,
                active: true,
            });
        }

        (store, category.id)
    }

    #[test]
    fn nearer_candidate_ranks_first_when_location_known() {
        let origin = GeoPoint {
            lat: -34.6037,
            lng: -58.3816,
        };
        let near = candidate(2, Some((-34.6040, -58.3820)), Some(3.0));
        let far = candidate(1, Some((-34.9, -57.9)), Some(5.0));
        let unknown = candidate(3, None, Some(5.0));

        let ranked = rank_candidates(vec![unknown, far, near], Some(&origin));

        assert_eq!(ids(&ranked), vec![2, 1, 3]);
    }

    #[test]
    fn rating_then_id_break_ties_without_location() {
        let ranked = rank_candidates(
            vec![
                candidate(4, None, None),
                candidate(3, None, Some(4.0)),
                candidate(2, None, Some(4.8)),
                candidate(1, None, Some(4.0)),
            ],
            None,
        );

        assert_eq!(ids(&ranked), vec![2, 1, 3, 4]);
    }

    #[test]
    fn never_returns_more_than_max_count() {
        let (store, category_id) = seeded_store(8);

        let selected = select_candidates(&store, category_id, &HashSet::new(), 5, None).unwrap();

        assert_eq!(selected.len(), 5);
        let distinct: HashSet<Uuid> = selected.iter().copied().collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn excluded_contractors_are_never_selected() {
        let (store, category_id) = seeded_store(3);
        let excluded: HashSet<Uuid> = [Uuid::from_u128(1), Uuid::from_u128(2)].into();

        let selected = select_candidates(&store, category_id, &excluded, 5, None).unwrap();
        assert_eq!(selected, vec![Uuid::from_u128(3)]);

        let all: HashSet<Uuid> = (1..=3).map(Uuid::from_u128).collect();
        let none = select_candidates(&store, category_id, &all, 5, None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn inactive_contractors_and_offerings_are_ineligible() {
        let (store, category_id) = seeded_store(2);
        store.set_user_active(Uuid::from_u128(1), false);

        let selected = select_candidates(&store, category_id, &HashSet::new(), 5, None).unwrap();

        assert_eq!(selected, vec![Uuid::from_u128(2)]);
    }

    #[test]
    fn rejects_zero_max_count_and_unknown_category() {
        let (store, category_id) = seeded_store(1);

        let zero = select_candidates(&store, category_id, &HashSet::new(), 0, None);
        assert!(matches!(zero, Err(AppError::Validation(_))));

        let unknown = select_candidates(&store, Uuid::new_v4(), &HashSet::new(), 1, None);
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }
}
