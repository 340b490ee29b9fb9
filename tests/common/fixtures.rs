//! Generated chart pages in the shape the parser expects.

/// Render rows as chart page HTML.
pub fn chart_page(rows: &[(u32, String, String)]) -> String {
    let body: String = rows
        .iter()
        .map(|(position, title, artist)| {
            format!(
                r#"
    <div class="o-chart-results-list-row-container">
      <ul class="o-chart-results-list-row">
        <li><span class="c-label">{}</span></li>
        <li><img src="cover.jpg"></li>
        <li><span>trend</span></li>
        <li>
          <ul>
            <li><h3 id="title-of-a-story" class="c-title">{}</h3><span class="c-label">{}</span></li>
          </ul>
        </li>
      </ul>
    </div>"#,
                position, title, artist
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>Chart</title></head><body><div class=\"chart-results-list\">{}</div></body></html>",
        body
    )
}

/// Raw title cell for `position`, with a badge on some rows.
pub fn raw_title(seed: &str, position: u32) -> String {
    let badge = match position % 10 {
        1 => "NEW\n",
        2 => "RE-\nENTRY\n",
        _ => "",
    };
    format!("{}Song {} {}", badge, seed, position)
}

/// Title expected after cleanup.
pub fn expected_title(seed: &str, position: u32) -> String {
    format!("Song {} {}", seed, position)
}

/// Artist credit for `position`, cycling through the credit shapes.
pub fn credit(position: u32) -> String {
    match position % 4 {
        0 => format!("Artist {}", position),
        1 => format!("Artist {} Featuring Guest {}", position, position),
        2 => "Diana Ross & The Supremes".to_string(),
        _ => format!("Artist {}, Partner {} & Friend {}", position, position, position),
    }
}

/// A complete 100-row chart page.
pub fn full_chart_page(seed: &str) -> String {
    let rows: Vec<_> = (1..=100)
        .map(|p| (p, raw_title(seed, p), credit(p)))
        .collect();
    chart_page(&rows)
}

/// Placeholder page served instead of chart content.
pub fn shell_page() -> String {
    "<!DOCTYPE html><html><body><div id=\"app\">Loading...</div></body></html>".to_string()
}
