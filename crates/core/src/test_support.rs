//! In-memory backend and fixtures for unit tests.

use crate::backend::{Backend, BackendRequest, BackendResponse, Method, TransportFailure};
use crate::constants::CREATE_RESOURCES;
use crate::intake::FamilyPlanningIntake;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

enum Scripted {
    Status(u16, String),
    Drop,
}

/// Records every request and mints sequential identifiers for POSTs to known resources.
///
/// Paths can be scripted to answer with a fixed status or to drop the connection; scripts
/// match on path prefix so `fail_path("familyplanning/fp_record/", ..)` also covers PATCHes
/// to `familyplanning/fp_record/<id>/`.
pub(crate) struct MockBackend {
    calls: Mutex<Vec<BackendRequest>>,
    scripts: Mutex<Vec<(String, Scripted)>>,
    lookups: Mutex<HashMap<String, Value>>,
    next_id: AtomicI64,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            lookups: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub(crate) fn fail_path(&self, path: &str, status: u16, body: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push((path.to_owned(), Scripted::Status(status, body.to_owned())));
    }

    pub(crate) fn drop_path(&self, path: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push((path.to_owned(), Scripted::Drop));
    }

    /// Answer GETs to `path` with `body` and status 200.
    pub(crate) fn serve(&self, path: &str, body: Value) {
        self.lookups.lock().unwrap().insert(path.to_owned(), body);
    }

    pub(crate) fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path.starts_with(path))
            .count()
    }

    pub(crate) fn posted_paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == Method::Post)
            .map(|c| c.path.clone())
            .collect()
    }

    /// Body of the first POST to `path`.
    pub(crate) fn body_posted_to(&self, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.method == Method::Post && c.path == path)
            .and_then(|c| c.body.clone())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn send(&self, request: BackendRequest) -> Result<BackendResponse, TransportFailure> {
        self.calls.lock().unwrap().push(request.clone());

        {
            let scripts = self.scripts.lock().unwrap();
            if let Some((_, script)) = scripts.iter().find(|(p, _)| request.path.starts_with(p)) {
                return match script {
                    Scripted::Status(status, body) => Ok(BackendResponse {
                        status: *status,
                        body: body.clone(),
                    }),
                    Scripted::Drop => Err(TransportFailure("connection reset by peer".into())),
                };
            }
        }

        match request.method {
            Method::Get => {
                let lookups = self.lookups.lock().unwrap();
                Ok(match lookups.get(&request.path) {
                    Some(body) => BackendResponse {
                        status: 200,
                        body: body.to_string(),
                    },
                    None => BackendResponse {
                        status: 404,
                        body: r#"{"detail": "Not found."}"#.into(),
                    },
                })
            }
            Method::Post => {
                let Some(resource) = CREATE_RESOURCES.iter().find(|r| r.path == request.path)
                else {
                    return Ok(BackendResponse {
                        status: 404,
                        body: r#"{"detail": "Not found."}"#.into(),
                    });
                };
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let mut body = request.body.clone().unwrap_or_else(|| json!({}));
                body[resource.id_field] = json!(id);
                Ok(BackendResponse {
                    status: 201,
                    body: body.to_string(),
                })
            }
            Method::Patch => Ok(BackendResponse {
                status: 200,
                body: request
                    .body
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "{}".into()),
            }),
        }
    }
}

/// A complete family planning intake as the wizard submits it.
pub(crate) fn sample_intake(method_currently_used: &str) -> FamilyPlanningIntake {
    serde_json::from_value(json!({
        "subject": { "patId": "PAT0001" },
        "client": {
            "clientId": "FP-2024-0042",
            "incomeBracket": "5,000-10,000",
            "nhts": true,
            "fourPs": false,
            "planMoreChildren": true
        },
        "visitType": {
            "clientType": "New Acceptor",
            "reasonForFp": "spacing",
            "methodCurrentlyUsed": method_currently_used
        },
        "stiRisk": { "abnormalDischarge": false, "sores": false },
        "vawRisk": { "domesticViolence": false },
        "obstetrical": {
            "gravida": 2,
            "para": 2,
            "fullterm": 2,
            "livingChildren": 2,
            "lastDeliveryDate": "2023-03-14",
            "lastDeliveryType": "Vaginal",
            "lastPeriod": "2024-05-01",
            "menstrualFlow": "Moderate"
        },
        "physicalExam": {
            "weightKg": 60.0,
            "heightCm": 160.0,
            "bloodPressure": "110/70",
            "pulseRate": 72
        },
        "pelvicExam": { "uterinePosition": "Mid" },
        "acknowledgement": {
            "clientName": "Maria Santos",
            "clientSignature": "data:image/png;base64,AAAA",
            "signatureDate": "2024-05-20"
        },
        "serviceProvision": {
            "followUpDate": "2024-08-20",
            "quantity": 3,
            "providerName": "Nurse Reyes",
            "providerSignature": "data:image/png;base64,BBBB"
        },
        "pregnancyCheck": { "breastfeeding": true, "recentBaby": false }
    }))
    .expect("sample intake should deserialise")
}
