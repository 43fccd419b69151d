use super::value_objects::{EligibilityResult, Offer, UserProfile};

// ============================================================================
// Eligibility Decision
// ============================================================================
//
// Pure and total: every offer gets exactly one result, in input order.
// Out-of-range inputs (negative income, NaN score) simply fail the
// threshold.
//
// ============================================================================

pub const MIN_CREDIT_SCORE: f64 = 700.0;
pub const MIN_INCOME: f64 = 30_000.0;

const ELIGIBLE_REASON: &str = "Eligible based on good credit score and income.";
const NOT_ELIGIBLE_REASON: &str = "Not eligible: insufficient credit score or income.";

pub fn is_eligible(profile: &UserProfile) -> bool {
    profile.credit_score >= MIN_CREDIT_SCORE && profile.income >= MIN_INCOME
}

pub fn evaluate(profile: &UserProfile, offers: &[Offer]) -> Vec<EligibilityResult> {
    let eligible = is_eligible(profile);
    let reason = if eligible { ELIGIBLE_REASON } else { NOT_ELIGIBLE_REASON };

    offers
        .iter()
        .map(|offer| EligibilityResult {
            offer: offer.clone(),
            eligible,
            reason: reason.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loan::OfferCatalog;

    fn profile(credit_score: f64, income: f64) -> UserProfile {
        UserProfile {
            age: 30,
            income,
            credit_score,
            location: "Pune".to_string(),
        }
    }

    fn decisions(credit_score: f64, income: f64) -> Vec<bool> {
        evaluate(&profile(credit_score, income), OfferCatalog::seeded().all())
            .into_iter()
            .map(|r| r.eligible)
            .collect()
    }

    #[test]
    fn test_good_profile_eligible_for_every_offer() {
        let results = evaluate(&profile(720.0, 40_000.0), OfferCatalog::seeded().all());

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.eligible));
        assert_eq!(results[0].reason, ELIGIBLE_REASON);
        assert_eq!(results[0].offer.loan_type, "Home Loan");
    }

    #[test]
    fn test_low_credit_score_not_eligible() {
        assert_eq!(decisions(650.0, 40_000.0), [false, false, false]);
    }

    #[test]
    fn test_low_income_not_eligible() {
        let results = evaluate(&profile(750.0, 29_999.0), OfferCatalog::seeded().all());

        assert!(results.iter().all(|r| !r.eligible));
        assert_eq!(results[2].reason, NOT_ELIGIBLE_REASON);
    }

    #[test]
    fn test_thresholds_inclusive() {
        assert_eq!(decisions(700.0, 30_000.0), [true, true, true]);
    }

    #[test]
    fn test_out_of_range_inputs() {
        assert_eq!(decisions(-1.0, -5.0), [false, false, false]);
        assert_eq!(decisions(f64::NAN, 50_000.0), [false, false, false]);
    }

    #[test]
    fn test_empty_catalog() {
        assert!(evaluate(&profile(800.0, 90_000.0), &[]).is_empty());
    }
}
