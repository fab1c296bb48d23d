use chrono::{DateTime, Utc};
use rin_core::CouponMessage;

/// Plain-text rendering for text-only channels.
#[must_use]
pub fn format_coupon_message(message: &CouponMessage) -> String {
    let mut out = format!("✅ **{}**\n", message.name);
    if let Some(discount) = message.discount {
        out.push_str(&format!("> **Discount:** {discount}%\n"));
    }
    out.push_str(&format!("> **Code:** {}\n", message.code));
    out.push_str(&format!("> 🔗 [Apply Here]({})\n", message.url));
    out
}

/// Human expiry hint: "In N days", or "Today" once less than a day remains.
#[must_use]
pub fn expires_label(expiry: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days_left = (expiry - now).num_days();
    if days_left > 0 {
        format!("In {days_left} days")
    } else {
        "Today".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn message(discount: Option<f64>) -> CouponMessage {
        CouponMessage {
            name: "Warp Terminal Student Plan".to_string(),
            description: "Free Warp Premium".to_string(),
            code: "AUTO-APPLIED".to_string(),
            discount,
            url: "https://www.warp.dev/students".to_string(),
            source: "warp".to_string(),
            expiry: None,
        }
    }

    #[test]
    fn formats_with_discount() {
        assert_eq!(
            format_coupon_message(&message(Some(100.0))),
            "✅ **Warp Terminal Student Plan**\n\
             > **Discount:** 100%\n\
             > **Code:** AUTO-APPLIED\n\
             > 🔗 [Apply Here](https://www.warp.dev/students)\n"
        );
    }

    #[test]
    fn omits_unknown_discount_line() {
        let text = format_coupon_message(&message(None));
        assert!(!text.contains("Discount"));
        assert!(text.contains("> **Code:** AUTO-APPLIED"));
    }

    #[test]
    fn fractional_discount_keeps_decimals() {
        assert!(format_coupon_message(&message(Some(12.5))).contains("12.5%"));
    }

    #[test]
    fn expires_label_counts_whole_days() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(expires_label(now + Duration::days(10), now), "In 10 days");
        assert_eq!(expires_label(now + Duration::hours(5), now), "Today");
        assert_eq!(expires_label(now - Duration::days(1), now), "Today");
    }
}
