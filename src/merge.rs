//! Folding streamed fragments into one response.
//!
//! A streaming completion arrives as a sequence of `chat.completion.chunk`
//! objects, each carrying a small `delta`. [`merge_response`] folds them into
//! a single `chat.completion`-shaped [`Response`] whose choices carry a full
//! `message`:
//!
//! ```text
//! chunk 1: choices[0].delta = {role: assistant, content: "Hel"}
//! chunk 2: choices[0].delta = {content: "lo"}
//! chunk 3: choices[0].delta = {}, finish_reason = "stop", usage = {...}
//!
//! merged:  choices[0].message = {role: assistant, content: "Hello"},
//!          finish_reason = "stop", usage = {...}
//! ```
//!
//! Tool calls stream the same way, keyed by their `index`:
//!
//! ```text
//! chunk 1: tool_calls: [{ index: 0, id: "call_abc", function: { name: "get_weather" } }]
//! chunk 2: tool_calls: [{ index: 0, function: { arguments: "{\"loc" } }]
//! chunk 3: tool_calls: [{ index: 0, function: { arguments: "\":\"Paris\"}" } }]
//! ```
//!
//! Two rules are never broken by a later fragment: a choice's finish reason
//! and the response usage are both first-writer-wins.

use crate::types::{Choice, Message, Response, ToolCall};

/// Fold `fragment` into `accumulated`.
///
/// `None` is the identity: the first fragment becomes the base, with the
/// `.chunk` object suffix stripped and each delta turned into a message.
pub fn merge_response(accumulated: Option<Response>, fragment: Response) -> Response {
    match accumulated {
        None => start(fragment),
        Some(mut base) => {
            extend(&mut base, fragment);
            base
        }
    }
}

/// Fold a whole fragment sequence. `None` when there were no fragments.
pub fn merge_all<I>(fragments: I) -> Option<Response>
where
    I: IntoIterator<Item = Response>,
{
    fragments
        .into_iter()
        .fold(None, |acc, fragment| Some(merge_response(acc, fragment)))
}

fn start(mut fragment: Response) -> Response {
    if let Some(object) = fragment.object.strip_suffix(".chunk") {
        fragment.object = object.to_string();
    }

    for choice in &mut fragment.choices {
        settle(choice);
    }

    fragment
}

/// Replace the choice's delta with an equivalent message.
fn settle(choice: &mut Choice) {
    if let Some(delta) = choice.delta.take() {
        choice.message = Some(delta);
    }
}

fn extend(base: &mut Response, fragment: Response) {
    for (position, mut choice) in fragment.choices.into_iter().enumerate() {
        let Some(target) = base.choices.get_mut(position) else {
            // A choice that first shows up mid-stream.
            settle(&mut choice);
            base.choices.push(choice);
            continue;
        };

        if let Some(delta) = choice.delta.or(choice.message) {
            append_delta(target.message.get_or_insert_with(Message::default), delta);
        }

        if target.finish_reason.is_empty() {
            target.finish_reason = choice.finish_reason;
        }
    }

    if base.usage.is_none() {
        base.usage = fragment.usage;
    }
}

fn append_delta(message: &mut Message, delta: Message) {
    message.content.push_str(&delta.content);

    if let Some(refusal) = delta.refusal {
        message
            .refusal
            .get_or_insert_with(String::new)
            .push_str(&refusal);
    }

    for call in delta.tool_calls {
        merge_tool_call(&mut message.tool_calls, call);
    }
}

/// Continuation deltas carry no id. A delta whose id differs from the call
/// at its index is a new call: some providers omit `index` and send every
/// call whole in its own fragment.
fn merge_tool_call(calls: &mut Vec<ToolCall>, delta: ToolCall) {
    let target = calls.iter().rposition(|call| {
        call.index == delta.index
            && (delta.id.is_empty() || call.id.is_empty() || call.id == delta.id)
    });
    let Some(existing) = target.map(|position| &mut calls[position]) else {
        calls.push(delta);
        return;
    };

    if !delta.id.is_empty() {
        existing.id = delta.id;
    }
    if !delta.function.name.is_empty() {
        existing.function.name = delta.function.name;
    }
    existing.function.arguments.push_str(&delta.function.arguments);
}
