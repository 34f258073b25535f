use std::path::Path;

use nucleo_matcher::{
    pattern::{self, Normalization},
    Matcher,
};
use tower_lsp::lsp_types::{CompletionItem, CompletionList, CompletionParams, CompletionResponse};

use crate::{config::Settings, workspace::Workspace};

use self::link_completer::LinkCompleter;
use self::ref_name_completer::RefNameCompleter;

mod link_completer;
mod ref_name_completer;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    workspace: &'a Workspace,
    path: &'a Path,
    settings: &'a Settings,
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>, line: usize, character: usize) -> Option<Self>
    where
        Self: Sized + Completer<'a>;

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized;
}

pub trait Completable<'a, T: Completer<'a>>: Sized {
    fn completions(&self, completer: &T) -> Option<CompletionItem>;
}

/// Range indexes for one line of the file; NOT THE WHOLE FILE
type LineRange<T> = std::ops::Range<T>;

pub fn get_completions(
    workspace: &Workspace,
    params: &CompletionParams,
    path: &Path,
    config: &Settings,
) -> Option<CompletionResponse> {
    let completion_context = Context {
        workspace,
        path,
        settings: config,
    };

    // First matching completer wins
    run_completer::<LinkCompleter>(
        completion_context,
        params.text_document_position.position.line,
        params.text_document_position.position.character,
    )
    .or_else(|| {
        run_completer::<RefNameCompleter>(
            completion_context,
            params.text_document_position.position.line,
            params.text_document_position.position.character,
        )
    })
}

fn run_completer<'a, T: Completer<'a>>(
    context: Context<'a>,
    line: u32,
    character: u32,
) -> Option<CompletionResponse> {
    let completer = T::construct(context, line as usize, character as usize)?;
    let completions = completer.completions();

    let completions = completions
        .into_iter()
        .take(50)
        .flat_map(|completable| completable.completions(&completer))
        .collect::<Vec<CompletionItem>>();

    Some(CompletionResponse::List(CompletionList {
        is_incomplete: true,
        items: completions,
    }))
}

/// Rank candidate names against the entered filter text. An empty filter
/// keeps everything in the given order.
fn fuzzy_rank<T>(filter: &str, candidates: Vec<T>, name: impl Fn(&T) -> String) -> Vec<T> {
    if filter.is_empty() {
        return candidates;
    }

    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
    let pattern = pattern::Pattern::parse(
        filter,
        pattern::CaseMatching::Smart,
        Normalization::Smart,
    );

    let mut scored: Vec<(u32, T)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let mut buf = Vec::new();
            let score = pattern.score(
                nucleo_matcher::Utf32Str::new(&name(&candidate), &mut buf),
                &mut matcher,
            )?;
            Some((score, candidate))
        })
        .collect();
    scored.sort_by(|(a, _), (b, _)| Ord::cmp(b, a));
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}
