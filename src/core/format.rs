/// Whole-unit dollar string with thousands separators, e.g. `$1,234,567`.
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return amount.to_string();
    }
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
