use enrichmap_graph::style::{LABEL_COLOR, NEGATIVE_NES, NES_COLOR_RANGE, NEUTRAL_NES, POSITIVE_NES, cluster_colors};
use std::fmt::Write;

const WIDTH: u32 = 260;
const HEIGHT: u32 = 150;

/// Vector legend: the NES colour ramp and the two cluster swatches.
pub fn legend_svg() -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="Helvetica, Arial, sans-serif" font-size="12">"#
    );
    let _ = writeln!(
        svg,
        r#"  <defs><linearGradient id="nes-ramp" x1="0" x2="1" y1="0" y2="0"><stop offset="0" stop-color="{}"/><stop offset="0.5" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient></defs>"#,
        NEGATIVE_NES.to_hex(),
        NEUTRAL_NES.to_hex(),
        POSITIVE_NES.to_hex()
    );
    let text = LABEL_COLOR.to_hex();
    let _ = writeln!(
        svg,
        r#"  <text x="10" y="20" fill="{text}" font-weight="bold">Node colour (NES)</text>"#
    );
    let _ = writeln!(
        svg,
        r#"  <rect x="10" y="30" width="240" height="16" fill="url(#nes-ramp)" stroke="{text}" stroke-width="0.5"/>"#
    );
    for (x, anchor, value) in [
        (10, "start", -NES_COLOR_RANGE),
        (130, "middle", 0.0),
        (250, "end", NES_COLOR_RANGE),
    ] {
        let _ = writeln!(
            svg,
            r#"  <text x="{x}" y="62" fill="{text}" text-anchor="{anchor}">{value:+.0}</text>"#
        );
    }

    let _ = writeln!(
        svg,
        r#"  <text x="10" y="90" fill="{text}" font-weight="bold">Clusters</text>"#
    );
    for (i, (label, nes)) in [("Up-regulated", 1.0), ("Down-regulated", -1.0)]
        .into_iter()
        .enumerate()
    {
        let colors = cluster_colors(nes);
        let y = 100 + i * 24;
        let _ = writeln!(
            svg,
            r#"  <rect x="10" y="{y}" width="28" height="16" rx="6" fill="{}" fill-opacity="{:.3}" stroke="{}" stroke-opacity="{:.3}"/>"#,
            colors.fill.to_hex(),
            colors.fill.opacity(),
            colors.stroke.to_hex(),
            colors.stroke.opacity()
        );
        let _ = writeln!(
            svg,
            r#"  <text x="46" y="{}" fill="{text}">{label}</text>"#,
            y + 12
        );
    }
    svg.push_str("</svg>\n");
    svg
}
