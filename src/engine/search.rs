use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::evaluation::round_one_decimal;
use crate::models::user::{GeoPoint, User};
use crate::store::MemoryStore;

const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub category_id: Uuid,
    pub location: Option<GeoPoint>,
    pub service_date: NaiveDate,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableContractor {
    #[serde(flatten)]
    pub contractor: User,
    pub base_rate: Option<f64>,
    pub experience_years: u32,
    pub rating: Option<f64>,
    pub total_evaluations: usize,
    pub distance_km: Option<f64>,
}

/// Contractors a client could book for `service_date`: they offer the
/// category, are free that day and, when a location is given, sit inside the
/// radius. Best rated first, then most experienced.
pub fn search_available(store: &MemoryStore, criteria: &SearchCriteria) -> Vec<AvailableContractor> {
    let mut found: Vec<AvailableContractor> = store
        .category_offerings(criteria.category_id)
        .into_iter()
        .filter_map(|(contractor, offering)| {
            let distance_km = match &criteria.location {
                Some(origin) => {
                    let distance = haversine_km(origin, contractor.location.as_ref()?);
                    if distance > criteria.radius_km {
                        return None;
                    }
                    Some(round_one_decimal(distance))
                }
                None => None,
            };

            if store.has_active_appointment_on(contractor.id, criteria.service_date) {
                return None;
            }

            let evaluations = store.client_evaluations_of(contractor.id);
            let rating = store
                .average_client_rating(contractor.id)
                .map(round_one_decimal);

            Some(AvailableContractor {
                contractor,
                base_rate: offering.base_rate,
                experience_years: offering.experience_years,
                rating,
                total_evaluations: evaluations.len(),
                distance_km,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        compare_rating(a.rating, b.rating)
            .then_with(|| b.experience_years.cmp(&a.experience_years))
            .then_with(|| a.contractor.id.cmp(&b.contractor.id))
    });
    found.truncate(MAX_RESULTS);
    found
}

fn compare_rating(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
