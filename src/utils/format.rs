/// Converts integer base units to display units. Only for rendering; all
/// arithmetic upstream of this stays in integers.
pub fn to_display_units(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// "1234567.89" -> "1,234,567.89"
pub fn token_amount(value: f64) -> String {
    let negative = value < 0.0;
    let rendered = format!("{:.2}", value.abs());
    let (int_part, frac_part) = rendered.split_once('.').unwrap_or((&rendered, "00"));

    let mut grouped = String::new();
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

pub fn usd(value: f64) -> String {
    // Small quotes need more precision than a cent.
    if value != 0.0 && value.abs() < 0.01 {
        format!("${:.6}", value)
    } else {
        format!("${}", token_amount(value))
    }
}

pub fn percent(value: f64) -> String {
    format!("{:.1}%", value)
}
