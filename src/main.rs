use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use mdrefs::completion::get_completions;
use mdrefs::config::Settings;
use mdrefs::workspace::Workspace;
use mdrefs::{definition, diagnostics, folding, references, rename, symbol};

#[derive(Parser, Debug)]
#[command(name = "mdrefs", version, about = "Link and reference intelligence for Markdown workspaces")]
struct Cli {
    /// Communicate over stdio (the default; accepted for editor compatibility)
    #[arg(long)]
    stdio: bool,
}

struct Backend {
    client: Client,
    workspace: Arc<RwLock<Option<Workspace>>>,
    settings: Arc<RwLock<Option<Settings>>>,
    /// Cancelled and replaced whenever the workspace changes; in-flight
    /// workspace-wide queries observe it and bail out.
    cancel: Arc<RwLock<CancellationToken>>,
}

impl Backend {
    fn uri_to_path(uri: &Url) -> Result<PathBuf> {
        uri.to_file_path()
            .map_err(|_| Error::invalid_params(format!("not a file uri: {uri}")))
    }

    async fn settings(&self) -> Result<Settings> {
        self.settings
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::internal_error())
    }

    /// Cancel in-flight queries and hand out a fresh token.
    async fn reset_cancel(&self) -> CancellationToken {
        let mut guard = self.cancel.write().await;
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    }

    async fn update_document(&self, uri: &Url, text: &str, version: i32) {
        let Ok(path) = Self::uri_to_path(uri) else {
            return;
        };
        let Ok(settings) = self.settings().await else {
            return;
        };

        self.reset_cancel().await;
        {
            let mut guard = self.workspace.write().await;
            if let Some(workspace) = guard.as_mut() {
                workspace.update_document(&settings, &path, text, version);
            }
        }
        self.publish_diagnostics(uri).await;
    }

    async fn publish_diagnostics(&self, uri: &Url) {
        let Ok(path) = Self::uri_to_path(uri) else {
            return;
        };
        let Ok(settings) = self.settings().await else {
            return;
        };
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return;
        };
        if let Some(diags) = diagnostics::diagnostics(workspace, &settings, &path) {
            self.client
                .publish_diagnostics(uri.clone(), diags, None)
                .await;
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root_dir = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok())
            .ok_or_else(|| Error::invalid_params("a file-path workspace root is required"))?;

        let settings = Settings::new(&root_dir)
            .map_err(|err| Error::invalid_params(format!("settings: {err}")))?;
        let workspace = Workspace::construct(&settings, &root_dir)
            .map_err(|err| Error::invalid_params(format!("workspace scan: {err}")))?;

        *self.settings.write().await = Some(settings);
        *self.workspace.write().await = Some(workspace);

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "mdrefs".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        "(".into(),
                        "#".into(),
                        "[".into(),
                        "/".into(),
                    ]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
                selection_range_provider: Some(SelectionRangeProviderCapability::Simple(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "mdrefs initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.read().await.cancel();
        let mut guard = self.workspace.write().await;
        if let Some(workspace) = guard.as_mut() {
            workspace.dispose();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.update_document(
            &params.text_document.uri,
            &params.text_document.text,
            params.text_document.version,
        )
        .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync: the last change carries the whole document
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(
                &params.text_document.uri,
                &change.text,
                params.text_document.version,
            )
            .await;
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.publish_diagnostics(&params.text_document.uri).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let Ok(settings) = self.settings().await else {
            return;
        };
        self.reset_cancel().await;
        let mut guard = self.workspace.write().await;
        let Some(workspace) = guard.as_mut() else {
            return;
        };

        for event in params.changes {
            let Ok(path) = Self::uri_to_path(&event.uri) else {
                continue;
            };
            match event.typ {
                FileChangeType::DELETED => workspace.remove_document(&path),
                FileChangeType::CREATED | FileChangeType::CHANGED => {
                    if let Ok(text) = std::fs::read_to_string(&path) {
                        workspace.update_document(&settings, &path, &text, 0);
                    }
                }
                _ => {}
            }
        }
    }

    async fn did_change_configuration(&self, _params: DidChangeConfigurationParams) {
        // Settings live in files; reread them against the current root
        let root_dir = {
            let guard = self.workspace.read().await;
            guard.as_ref().map(|ws| ws.root_dir().to_path_buf())
        };
        if let Some(root_dir) = root_dir {
            if let Ok(settings) = Settings::new(&root_dir) {
                *self.settings.write().await = Some(settings);
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let path = Self::uri_to_path(&params.text_document_position.text_document.uri)?;
        let settings = self.settings().await?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(get_completions(workspace, &params, &path, &settings))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position_params = params.text_document_position_params;
        let path = Self::uri_to_path(&position_params.text_document.uri)?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(definition::goto_definition(workspace, position_params.position, &path)
            .map(GotoDefinitionResponse::Array))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let path = Self::uri_to_path(&params.text_document_position.text_document.uri)?;
        let settings = self.settings().await?;
        let cancel = self.cancel.read().await.clone();
        let mut guard = self.workspace.write().await;
        let Some(workspace) = guard.as_mut() else {
            return Ok(None);
        };
        Ok(references::references(workspace, &settings, &params, &path, &cancel))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        let path = Self::uri_to_path(&params.text_document.uri)?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(rename::prepare_rename(workspace, params.position, &path))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        let path = Self::uri_to_path(&params.text_document_position.text_document.uri)?;
        let settings = self.settings().await?;
        let cancel = self.cancel.read().await.clone();
        let mut guard = self.workspace.write().await;
        let Some(workspace) = guard.as_mut() else {
            return Ok(None);
        };
        Ok(rename::rename(workspace, &settings, &params, &path, &cancel))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let path = Self::uri_to_path(&params.text_document.uri)?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(symbol::document_symbol(workspace, &params, &path))
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        let settings = self.settings().await?;
        let cancel = self.cancel.read().await.clone();
        let mut guard = self.workspace.write().await;
        let Some(workspace) = guard.as_mut() else {
            return Ok(None);
        };
        Ok(symbol::workspace_symbol(workspace, &settings, &params, &cancel))
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        let path = Self::uri_to_path(&params.text_document.uri)?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(folding::folding_ranges(workspace, &path))
    }

    async fn selection_range(
        &self,
        params: SelectionRangeParams,
    ) -> Result<Option<Vec<SelectionRange>>> {
        let path = Self::uri_to_path(&params.text_document.uri)?;
        let guard = self.workspace.read().await;
        let Some(workspace) = guard.as_ref() else {
            return Ok(None);
        };
        Ok(folding::selection_ranges(workspace, &path, &params.positions))
    }

    async fn execute_command(&self, _: ExecuteCommandParams) -> Result<Option<Value>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| Backend {
        client,
        workspace: Arc::new(RwLock::new(None)),
        settings: Arc::new(RwLock::new(None)),
        cancel: Arc::new(RwLock::new(CancellationToken::new())),
    });
    Server::new(stdin, stdout, socket).serve(service).await;
}
