/// Region returned when every other choice is unavailable.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Fallback walk for clients whose region guess is unrecognized.
pub const DEFAULT_ORDER: [&str; 4] = ["us-east-1", "us-west-1", "eu-west-1", "ap-southeast-1"];

/// Regions to try, nearest first, for a client believed to be in `region`.
#[must_use]
pub fn adjacent_regions(region: &str) -> &'static [&'static str] {
    match region {
        "us-east-1" => &["us-east-1", "us-west-1", "eu-west-1", "ap-southeast-1"],
        "us-west-1" => &["us-west-1", "us-east-1", "ap-southeast-1", "eu-west-1"],
        "eu-west-1" => &["eu-west-1", "eu-central-1", "us-east-1", "ap-southeast-1"],
        "eu-central-1" => &["eu-central-1", "eu-west-1", "us-east-1", "ap-southeast-1"],
        "ap-southeast-1" => &["ap-southeast-1", "ap-east-1", "us-west-1", "eu-west-1"],
        "ap-east-1" => &["ap-east-1", "ap-southeast-1", "us-west-1", "eu-west-1"],
        "me-south-1" => &["me-south-1", "eu-central-1", "eu-west-1", "ap-southeast-1"],
        _ => &DEFAULT_ORDER,
    }
}

/// Map an ISO 3166-1 alpha-2 country code to an infrastructure region.
#[must_use]
pub fn region_for_country(country: &str) -> &'static str {
    match country.trim().to_ascii_uppercase().as_str() {
        "CN" => "ap-east-1",
        "IR" => "me-south-1",
        "RU" | "DE" => "eu-central-1",
        "GB" => "eu-west-1",
        _ => DEFAULT_REGION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_row_starts_with_its_key() {
        for region in ["us-east-1", "us-west-1", "eu-west-1", "eu-central-1", "ap-southeast-1", "ap-east-1", "me-south-1"] {
            assert_eq!(adjacent_regions(region)[0], region);
        }
        assert_eq!(adjacent_regions("mars-north-1"), &DEFAULT_ORDER);
        assert_eq!(adjacent_regions(""), &DEFAULT_ORDER);
    }

    #[test]
    fn country_mapping() {
        assert_eq!(region_for_country("IR"), "me-south-1");
        assert_eq!(region_for_country("cn"), "ap-east-1");
        assert_eq!(region_for_country("DE"), "eu-central-1");
        assert_eq!(region_for_country("US"), "us-east-1");
        assert_eq!(region_for_country("BR"), DEFAULT_REGION);
    }
}
