use super::value_objects::Offer;

/// Read-only list of loan offers, in display order.
#[derive(Debug, Clone)]
pub struct OfferCatalog {
    offers: Vec<Offer>,
}

impl OfferCatalog {
    pub fn new(offers: Vec<Offer>) -> Self {
        Self { offers }
    }

    /// The three offers the service ships with.
    pub fn seeded() -> Self {
        Self::new(vec![
            offer(1, "Home Loan", "Axis Bank", 7.8, 2000.0),
            offer(2, "Personal Loan", "HDFC", 10.5, 500.0),
            offer(3, "Car Loan", "ICICI", 9.2, 1000.0),
        ])
    }

    pub fn all(&self) -> &[Offer] {
        &self.offers
    }

    pub fn get(&self, id: u32) -> Option<&Offer> {
        self.offers.iter().find(|offer| offer.id == id)
    }
}

impl Default for OfferCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

fn offer(id: u32, loan_type: &str, provider: &str, interest_rate: f64, processing_fee: f64) -> Offer {
    Offer {
        id,
        loan_type: loan_type.to_string(),
        provider: provider.to_string(),
        interest_rate,
        processing_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_catalog_order() {
        let catalog = OfferCatalog::seeded();
        let types: Vec<_> = catalog.all().iter().map(|o| o.loan_type.as_str()).collect();

        assert_eq!(types, ["Home Loan", "Personal Loan", "Car Loan"]);
    }

    #[test]
    fn test_get_by_id() {
        let catalog = OfferCatalog::seeded();

        assert_eq!(catalog.get(2).map(|o| o.provider.as_str()), Some("HDFC"));
        assert!(catalog.get(42).is_none());
    }
}
