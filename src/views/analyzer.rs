use crate::controllers::{AnalyzerController, SelectedImage, mime_type_for};
use crate::services::AppServices;
use crate::types::ExtractedRecord;
use crate::views::shared::{display_fields, display_file_name, person_title};
use dioxus::html::{FileEngine, HasFileData};
use dioxus::prelude::*;
use std::sync::Arc;

const UNKNOWN_MIME: &str = "application/octet-stream";

async fn read_first_file(engine: Arc<dyn FileEngine>) -> Option<SelectedImage> {
    let path = engine.files().into_iter().next()?;
    let bytes = engine.read_file(&path).await?;
    let mime_type = mime_type_for(&path).unwrap_or(UNKNOWN_MIME);
    Some(SelectedImage::new(display_file_name(&path), mime_type, bytes))
}

#[component]
pub fn AnalyzerView() -> Element {
    let services = use_context::<AppServices>();
    let client = use_hook(|| services.extraction_client());
    let mut controller = use_signal(|| AnalyzerController::new(services.exporter.clone()));
    let mut dragging = use_signal(|| false);

    let accept_files = move |files: Option<Arc<dyn FileEngine>>| {
        let Some(engine) = files else { return };
        spawn(async move {
            if let Some(image) = read_first_file(engine).await {
                if let Err(err) = controller.write().select_file(image) {
                    tracing::debug!(error = %err, "file rejected");
                }
            }
        });
    };

    let analyze = move |_: MouseEvent| {
        let Some(image) = controller.write().begin_analysis() else {
            return;
        };
        let client = client.clone();
        spawn(async move {
            let result = client.analyze_document(&image.bytes, &image.mime_type).await;
            controller.write().complete_analysis(result);
        });
    };

    let (preview, file_name, analyzing, records, error) = {
        let state = controller.read();
        (
            state.selected().map(SelectedImage::data_url),
            state.selected().map(|image| image.file_name.clone()),
            state.is_analyzing(),
            state.records().map(<[ExtractedRecord]>::to_vec),
            state.error().map(str::to_string),
        )
    };
    let has_records = records.is_some();
    let drop_class = if dragging() { "drop-zone dragging" } else { "drop-zone" };

    rsx! {
        div { class: "analyzer",
            div { class: "analyzer-input",
                input {
                    id: "image-upload",
                    class: "hidden",
                    r#type: "file",
                    accept: "image/*",
                    onchange: move |evt: FormEvent| accept_files(evt.files()),
                }
                label {
                    r#for: "image-upload",
                    class: drop_class,
                    ondragover: move |evt: DragEvent| {
                        evt.prevent_default();
                        dragging.set(true);
                    },
                    ondragleave: move |_| dragging.set(false),
                    ondrop: move |evt: DragEvent| {
                        evt.prevent_default();
                        dragging.set(false);
                        accept_files(evt.files());
                    },
                    if let Some(src) = preview {
                        img { class: "preview", src: "{src}", alt: "Preview" }
                    } else {
                        div { class: "drop-hint",
                            p { class: "drop-title", "Drag & drop or click to upload" }
                            p { class: "text-muted", "PNG, JPG, GIF up to 10MB" }
                        }
                    }
                }
                if let Some(name) = file_name {
                    p { class: "file-name text-muted", "{name}" }
                    div { class: "analyzer-actions",
                        button {
                            class: "btn btn-primary",
                            r#type: "button",
                            disabled: analyzing,
                            onclick: analyze,
                            if analyzing { "Analyzing..." } else { "Analyze Document" }
                        }
                        if has_records && !analyzing {
                            button {
                                class: "btn btn-export",
                                r#type: "button",
                                onclick: move |_| {
                                    let _ = controller.write().export();
                                },
                                "Export to Excel"
                            }
                        }
                    }
                }
                if let Some(message) = error {
                    div { class: "error-banner", role: "alert", "{message}" }
                }
            }
            div { class: "analyzer-output",
                h3 { class: "section-title", "Extracted Data" }
                div { class: "results",
                    if analyzing {
                        div { class: "placeholder",
                            span { class: "shimmer-text", "AI is analyzing the document..." }
                        }
                    }
                    if let Some(people) = records {
                        for (index, person) in people.iter().enumerate() {
                            PersonCard { key: "{index}", record: person.clone(), index }
                        }
                    }
                    if !analyzing && !has_records {
                        div { class: "placeholder text-muted",
                            p { "Upload a document and click \"Analyze\"" }
                            p { "to see the extracted information here." }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn PersonCard(record: ExtractedRecord, index: usize) -> Element {
    let title = person_title(&record, index);
    let fields = display_fields(&record);
    rsx! {
        div { class: "person-card",
            h4 { class: "person-title", "{title}" }
            dl { class: "person-fields",
                for (label, value) in fields {
                    div { class: "data-field",
                        dt { "{label}" }
                        dd { "{value}" }
                    }
                }
            }
        }
    }
}
