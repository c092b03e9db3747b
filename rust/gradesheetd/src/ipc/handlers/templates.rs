use crate::ipc::error::{err, ok};
use crate::ipc::helpers::get_str;
use crate::ipc::types::{AppState, Request};
use crate::templates::list_templates;
use serde_json::json;

fn handle_templates_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(root) = state.templates_root() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(class) = get_str(req, "class") else {
        return err(&req.id, "bad_params", "missing class", None);
    };

    match list_templates(&root, class) {
        Ok(templates) => ok(
            &req.id,
            json!({ "success": true, "templates": templates }),
        ),
        Err(e) => err(
            &req.id,
            "bad_params",
            format!("{e:#}"),
            Some(json!({ "class": class })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "templates.list" => Some(handle_templates_list(state, req)),
        _ => None,
    }
}
