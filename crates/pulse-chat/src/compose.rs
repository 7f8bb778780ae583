//! Context compositor.
//!
//! Renders a [`ContextSnapshot`] and the caller identity into the text block
//! prepended to the first message of a conversation. Pure and deterministic:
//! identical inputs always produce byte-identical output.

use std::fmt::Write;

use pulse_core::{CallerIdentity, ContextSnapshot, Record, SourceKind, SourceResult};

/// Longest rendered value for any single field, in characters.
pub const MAX_FIELD_CHARS: usize = 120;

/// Warning line emitted when no source produced data.
pub const DEGRADED_WARNING: &str = "ATENÇÃO: nenhuma fonte de dados retornou informações agora. \
Não invente números; avise o usuário que os dados estão indisponíveis no momento.";

/// Line emitted for a source with no records.
pub const EMPTY_SECTION: &str = "(nenhum registro)";

const UNAVAILABLE_SECTION: &str = "(fonte indisponível)";
const MISSING_TEXT: &str = "-";

enum Field {
    Text(&'static str, &'static str),
    Number(&'static str, &'static str),
}

struct Section {
    label: &'static str,
    total_key: &'static str,
    fields: &'static [Field],
}

fn section(kind: SourceKind) -> Section {
    match kind {
        SourceKind::Leads => Section {
            label: "Leads",
            total_key: "leads",
            fields: &[
                Field::Text("name", "nome"),
                Field::Text("company", "empresa"),
                Field::Text("status", "status"),
                Field::Number("value", "valor"),
            ],
        },
        SourceKind::Partners => Section {
            label: "Parceiros",
            total_key: "parceiros",
            fields: &[
                Field::Text("name", "nome"),
                Field::Text("segment", "segmento"),
                Field::Text("city", "cidade"),
            ],
        },
        SourceKind::Products => Section {
            label: "Produtos",
            total_key: "produtos",
            fields: &[
                Field::Text("name", "nome"),
                Field::Text("sku", "sku"),
                Field::Number("stock", "estoque"),
                Field::Number("price", "preço"),
            ],
        },
        SourceKind::Orders => Section {
            label: "Pedidos",
            total_key: "pedidos",
            fields: &[
                Field::Text("number", "número"),
                Field::Text("customer", "cliente"),
                Field::Text("status", "status"),
                Field::Number("total", "total"),
            ],
        },
    }
}

/// Cut a value to [`MAX_FIELD_CHARS`] and flatten line breaks so every
/// record stays on one line.
fn bound(value: &str) -> String {
    value
        .chars()
        .take(MAX_FIELD_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn render_record(record: &Record, fields: &[Field]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| match field {
            Field::Text(key, label) => {
                let value = record.text(key).unwrap_or_else(|| MISSING_TEXT.to_string());
                format!("{}: {}", label, bound(&value))
            }
            Field::Number(key, label) => {
                format!("{}: {}", label, bound(&record.number(key).to_string()))
            }
        })
        .collect();
    format!("- {}", parts.join(" | "))
}

fn render_section(out: &mut String, kind: SourceKind, result: &SourceResult) {
    let section = section(kind);
    let _ = writeln!(
        out,
        "{} (mostrando {} de {}):",
        section.label,
        result.items.len(),
        result.total
    );
    if !result.ok {
        let _ = writeln!(out, "{}", UNAVAILABLE_SECTION);
    } else if result.items.is_empty() {
        let _ = writeln!(out, "{}", EMPTY_SECTION);
    } else {
        for record in &result.items {
            let _ = writeln!(out, "{}", render_record(record, section.fields));
        }
    }
}

/// Totals line, e.g. `Totais: leads=3, parceiros=5, produtos=0, pedidos=2`.
pub fn totals_line(snapshot: &ContextSnapshot) -> String {
    let totals: Vec<String> = SourceKind::ALL
        .iter()
        .map(|kind| format!("{}={}", section(*kind).total_key, snapshot.get(*kind).total))
        .collect();
    format!("Totais: {}", totals.join(", "))
}

/// Build the augmented first-turn message.
///
/// The user's message is appended last, verbatim.
pub fn compose(snapshot: &ContextSnapshot, caller: &CallerIdentity, message: &str) -> String {
    let mut out = String::with_capacity(2048 + message.len());

    out.push_str("[Contexto]\n");
    let _ = writeln!(out, "Usuário: {}", bound(&caller.display_name));
    if !snapshot.has_any_data() {
        let _ = writeln!(out, "{}", DEGRADED_WARNING);
    }
    let _ = writeln!(out, "{}", totals_line(snapshot));

    for kind in SourceKind::ALL {
        out.push('\n');
        render_section(&mut out, kind, snapshot.get(kind));
    }

    out.push_str("\n[Pergunta]\n");
    out.push_str(message);
    out
}
