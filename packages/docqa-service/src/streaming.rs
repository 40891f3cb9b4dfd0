use std::{
	pin::Pin,
	task::{Context, Poll},
};

use futures::Stream;

use crate::{TokenStream, retrieval::RetrievedChunk};

#[derive(Clone, Debug, PartialEq)]
pub enum AnswerEvent {
	Sources(Vec<RetrievedChunk>),
	Token(String),
	Error { message: String },
	End,
}
impl AnswerEvent {
	/// The event name used on the wire.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Sources(_) => "sources",
			Self::Token(_) => "token",
			Self::Error { .. } => "error",
			Self::End => "end",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
	Sources,
	Streaming,
	Done,
	Closed,
}

/// Emits `sources`, then one `token` per generator increment, then `end`.
///
/// A generator failure yields a single `error` in place of the remaining tokens and is still
/// followed by `end`. Nothing is emitted after `end`.
pub struct AnswerStreamer {
	state: State,
	sources: Vec<RetrievedChunk>,
	tokens: TokenStream,
}
impl AnswerStreamer {
	pub fn new(sources: Vec<RetrievedChunk>, tokens: TokenStream) -> Self {
		Self { state: State::Sources, sources, tokens }
	}
}

impl Stream for AnswerStreamer {
	type Item = AnswerEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = &mut *self;

		match this.state {
			State::Sources => {
				this.state = State::Streaming;

				Poll::Ready(Some(AnswerEvent::Sources(std::mem::take(&mut this.sources))))
			},
			State::Streaming => match this.tokens.as_mut().poll_next(cx) {
				Poll::Ready(Some(Ok(token))) => Poll::Ready(Some(AnswerEvent::Token(token))),
				Poll::Ready(Some(Err(err))) => {
					tracing::warn!(error = %err, "Answer generation failed mid-stream.");

					this.state = State::Done;

					Poll::Ready(Some(AnswerEvent::Error { message: err.to_string() }))
				},
				Poll::Ready(None) => {
					this.state = State::Closed;

					Poll::Ready(Some(AnswerEvent::End))
				},
				Poll::Pending => Poll::Pending,
			},
			State::Done => {
				this.state = State::Closed;

				Poll::Ready(Some(AnswerEvent::End))
			},
			State::Closed => Poll::Ready(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use color_eyre::eyre;
	use futures::{StreamExt, stream};

	use super::*;

	fn sources() -> Vec<RetrievedChunk> {
		vec![RetrievedChunk {
			text: "Paris is the capital of France.".to_string(),
			score: 0.9,
			doc_id: "doc".to_string(),
			source: "facts.txt".to_string(),
		}]
	}

	#[tokio::test]
	async fn emits_sources_tokens_then_end() {
		let tokens = stream::iter(vec![Ok("Par".to_string()), Ok("is".to_string())]).boxed();
		let events: Vec<AnswerEvent> = AnswerStreamer::new(sources(), tokens).collect().await;

		assert_eq!(events, vec![
			AnswerEvent::Sources(sources()),
			AnswerEvent::Token("Par".to_string()),
			AnswerEvent::Token("is".to_string()),
			AnswerEvent::End,
		]);
	}

	#[tokio::test]
	async fn empty_generation_still_ends() {
		let events: Vec<AnswerEvent> =
			AnswerStreamer::new(Vec::new(), stream::empty().boxed()).collect().await;

		assert_eq!(events, vec![AnswerEvent::Sources(Vec::new()), AnswerEvent::End]);
	}

	#[tokio::test]
	async fn failure_replaces_remaining_tokens() {
		let tokens = stream::iter(vec![
			Ok("A".to_string()),
			Err(eyre::eyre!("model crashed")),
			Ok("B".to_string()),
		])
		.boxed();
		let events: Vec<AnswerEvent> = AnswerStreamer::new(sources(), tokens).collect().await;
		let names: Vec<&str> = events.iter().map(AnswerEvent::name).collect();

		assert_eq!(names, vec!["sources", "token", "error", "end"]);
		assert_eq!(events[2], AnswerEvent::Error { message: "model crashed".to_string() });
	}
}
