use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, delete, get, post, put, web};
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, error::AppError, models::nodes::UploadedFile};

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(
        web::scope("/api")
            .service(get_tree)
            .service(download_file)
            .service(upload_files)
            .service(create_folder)
            .service(rename_item)
            .service(delete_items),
    );
}

#[get("/healthz")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "stashd",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[get("/files")]
async fn get_tree(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let tree = state.storage.list_tree().await?;
    Ok(HttpResponse::Ok().json(tree))
}

#[get("/files/{storage_ref:.*}")]
async fn download_file(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let storage_ref = path.into_inner();
    let (bytes, mime) = state.storage.read_file(&storage_ref).await?;
    Ok(HttpResponse::Ok().content_type(mime).body(bytes))
}

#[post("/upload")]
async fn upload_files(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut folder_path = String::new();
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|err| AppError::BadRequest(format!("multipart error: {err}")))?
    {
        let content_disposition = field.content_disposition().clone();
        let field_name = content_disposition.get_name().unwrap_or("").to_string();

        match field_name.as_str() {
            "folderPath" => {
                folder_path = collect_text_field(&mut field).await?;
            }
            "files" => {
                let filename = content_disposition
                    .get_filename()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "upload.bin".into());
                let mimetype = field.content_type().map(|mime| mime.to_string());

                let mut sink = state
                    .storage
                    .begin_upload(&folder_path, &filename, mimetype)
                    .await?;
                loop {
                    let chunk = match field.try_next().await {
                        Ok(Some(chunk)) => chunk,
                        Ok(None) => break,
                        Err(err) => {
                            // Client went away mid-stream; drop the partial file.
                            sink.discard().await;
                            return Err(AppError::BadRequest(format!(
                                "failed to read upload: {err}"
                            )));
                        }
                    };
                    if let Err(err) = sink.write_chunk(&chunk).await {
                        sink.discard().await;
                        return Err(err);
                    }
                }
                files.push(sink.finish().await?);
            }
            _ => {
                // Ignore unknown fields
                drain_field(&mut field).await?;
            }
        }
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("no files provided".into()));
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "files": files,
        "message": format!("{} file(s) uploaded successfully", files.len())
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFolderRequest {
    name: String,
    #[serde(default)]
    parent_path: String,
}

#[post("/folders")]
async fn create_folder(
    request: web::Json<CreateFolderRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let CreateFolderRequest { name, parent_path } = request.into_inner();
    let path = state.storage.create_folder(&parent_path, &name).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "path": path,
        "message": "Folder created successfully"
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    old_path: String,
    new_name: String,
}

#[put("/rename")]
async fn rename_item(
    request: web::Json<RenameRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let RenameRequest { old_path, new_name } = request.into_inner();
    let new_path = state.storage.rename(&old_path, &new_name).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "oldPath": old_path,
        "newPath": new_path,
        "message": "Item renamed successfully"
    })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    items: Vec<String>,
}

#[delete("/delete")]
async fn delete_items(
    request: web::Json<DeleteRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let deleted = state.storage.delete(&request.items).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "deletedItems": deleted,
        "message": format!("{} item(s) deleted successfully", deleted.len())
    })))
}

async fn collect_text_field(field: &mut Field) -> Result<String, AppError> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|err| AppError::BadRequest(format!("failed to read field: {err}")))?
    {
        data.extend_from_slice(&chunk);
    }
    let value = String::from_utf8(data)
        .map_err(|_| AppError::BadRequest("field is not valid UTF-8".into()))?;
    Ok(value.trim().to_string())
}

async fn drain_field(field: &mut Field) -> Result<(), AppError> {
    while field
        .try_next()
        .await
        .map_err(|err| AppError::BadRequest(format!("failed to read field: {err}")))?
        .is_some()
    {}
    Ok(())
}
