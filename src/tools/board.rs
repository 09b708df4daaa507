//! 看板工具：createBoard / getBoard / updateBoard / deleteBoard / listBoards

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::resources::{BoardCreate, BoardFilter, BoardUpdate, ResourceGateway};
use crate::tools::{success, ToolFuture, ToolRegistry, TypedTool};

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardIdArgs {
    /// 看板 id（24 位十六进制）
    pub board_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBoardArgs {
    pub board_id: String,
    #[serde(flatten)]
    pub changes: BoardUpdate,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListBoardsArgs {
    /// open / closed / starred / unstarred / all，默认 all
    #[serde(default)]
    pub filter: Option<BoardFilter>,
}

fn create_board(gw: Arc<ResourceGateway>, args: BoardCreate) -> ToolFuture {
    Box::pin(async move {
        let board = gw.create_board(args).await?;
        let message = format!(
            "Successfully created board \"{}\" with ID: {}",
            board.name, board.id
        );
        Ok(success("board", json!(board), message))
    })
}

fn get_board(gw: Arc<ResourceGateway>, args: BoardIdArgs) -> ToolFuture {
    Box::pin(async move {
        let board = gw.get_board(&args.board_id).await?;
        let message = format!(
            "Successfully retrieved board \"{}\" (ID: {})",
            board.name, board.id
        );
        Ok(success("board", json!(board), message))
    })
}

fn update_board(gw: Arc<ResourceGateway>, args: UpdateBoardArgs) -> ToolFuture {
    Box::pin(async move {
        let board = gw.update_board(&args.board_id, args.changes).await?;
        let message = format!(
            "Successfully updated board \"{}\" (ID: {})",
            board.name, board.id
        );
        Ok(success("board", json!(board), message))
    })
}

fn delete_board(gw: Arc<ResourceGateway>, args: BoardIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete_board(&args.board_id).await?;
        let message = format!("Successfully deleted board with ID: {}", args.board_id);
        Ok(success("boardId", json!(args.board_id), message))
    })
}

fn list_boards(gw: Arc<ResourceGateway>, args: ListBoardsArgs) -> ToolFuture {
    Box::pin(async move {
        let filter = args.filter.unwrap_or_default();
        let boards = gw.list_boards(filter).await?;
        let message = format!("Successfully retrieved {} board(s)", boards.len());
        let mut out = success("boards", json!(boards), message);
        out["count"] = json!(boards.len());
        out["filter"] = json!(filter);
        Ok(out)
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createBoard",
        "Create a new Trello board with a name, optional description, visibility and background. Default lists and labels are created unless disabled.",
        gw.clone(),
        create_board,
    ));
    registry.register(TypedTool::new(
        "getBoard",
        "Get the details of a Trello board by its ID",
        gw.clone(),
        get_board,
    ));
    registry.register(TypedTool::new(
        "updateBoard",
        "Update a Trello board's name, description, archived state or preferences",
        gw.clone(),
        update_board,
    ));
    registry.register(TypedTool::new(
        "deleteBoard",
        "Permanently delete a Trello board and everything on it",
        gw.clone(),
        delete_board,
    ));
    registry.register(TypedTool::new(
        "listBoards",
        "List the Trello boards accessible to the user, optionally filtered",
        gw.clone(),
        list_boards,
    ));
}
