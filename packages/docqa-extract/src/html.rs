use scraper::{Html, Node};

const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Returns the visible text of an HTML document, one space between text nodes.
pub(crate) fn extract(html: &str) -> String {
	let document = Html::parse_document(html);
	let mut parts = Vec::new();

	for node in document.tree.root().descendants() {
		let Node::Text(text) = node.value() else {
			continue;
		};
		let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
			Node::Element(element) => SKIPPED_TAGS.contains(&element.name()),
			_ => false,
		});

		if hidden {
			continue;
		}

		let trimmed = text.trim();

		if !trimmed.is_empty() {
			parts.push(trimmed);
		}
	}

	parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
