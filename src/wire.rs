use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::scheduler::{Scheduler, SchedulerError};

const MAX_LINE_LEN: usize = 64 * 1024;

/// One request per line, JSON, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Mandatory first frame: cleartext shared-secret handshake.
    Hello {
        token: String,
    },
    RegisterItem {
        category: Category,
        name: String,
        serial: Option<String>,
    },
    UpdateItem {
        item: Ulid,
        name: String,
        serial: Option<String>,
    },
    RetireItem {
        item: Ulid,
    },
    ListItems {
        category: Option<Category>,
    },
    Availability {
        category: Category,
        start: Ms,
        end: Ms,
        exclude_reservation: Option<Ulid>,
    },
    FreeWindows {
        item: Ulid,
        start: Ms,
        end: Ms,
    },
    Reserve {
        items: Vec<Ulid>,
        holder: String,
        start: Ms,
        end: Ms,
        origin: Origin,
    },
    Release {
        holder: String,
        origin: Origin,
    },
    Transfer {
        from_holder: String,
        to_holder: String,
        origin: Origin,
    },
    TransferReservation {
        reservation: Ulid,
        to_holder: String,
    },
    ReplaceKit {
        holder: String,
        origin: Origin,
        items: Vec<Ulid>,
        start: Ms,
        end: Ms,
    },
    HolderView {
        task_id: String,
    },
    ItemReservations {
        item: Ulid,
    },
    /// Switch this connection into streaming mode for one item's mutations
    /// (or the whole pool when `item` is absent). Requests keep working;
    /// events are interleaved as `{"result":"event",...}` lines.
    Subscribe {
        item: Option<Ulid>,
    },
}

/// One response per line, JSON, tagged by `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Item {
        item: EquipmentItem,
    },
    Items {
        items: Vec<EquipmentItem>,
    },
    Reservation {
        reservation: Reservation,
    },
    Reservations {
        reservations: Vec<Reservation>,
    },
    Released {
        count: usize,
    },
    Windows {
        windows: Vec<TimeRange>,
    },
    View {
        holders: BTreeMap<String, ShiftAssignments>,
    },
    Subscribed,
    Event {
        event: LedgerEvent,
    },
    Error {
        code: String,
        message: String,
    },
}

fn error_response(e: SchedulerError) -> Response {
    let code: &str = match &e {
        SchedulerError::NotFound(_) => "not_found",
        SchedulerError::Retired(_) => "retired",
        SchedulerError::Conflict { .. } => {
            metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
            "conflict"
        }
        SchedulerError::NothingToTransfer { .. } => "nothing_to_transfer",
        SchedulerError::InvalidInterval { .. } => "invalid_interval",
        SchedulerError::LimitExceeded(_) => "limit_exceeded",
        SchedulerError::JournalError(_) => "journal_error",
    };
    Response::Error {
        code: code.to_string(),
        message: e.to_string(),
    }
}

async fn dispatch(scheduler: &Scheduler, req: Request) -> Response {
    match req {
        // Handshake repeats and Subscribe are handled by the connection loop.
        Request::Hello { .. } | Request::Subscribe { .. } => Response::Ok,
        Request::RegisterItem {
            category,
            name,
            serial,
        } => match scheduler.register_item(category, name, serial).await {
            Ok(item) => Response::Item { item },
            Err(e) => error_response(e),
        },
        Request::UpdateItem { item, name, serial } => {
            match scheduler.update_item(item, name, serial).await {
                Ok(()) => Response::Ok,
                Err(e) => error_response(e),
            }
        }
        Request::RetireItem { item } => match scheduler.retire_item(item).await {
            Ok(()) => Response::Ok,
            Err(e) => error_response(e),
        },
        Request::ListItems { category } => Response::Items {
            items: scheduler.list_items(category).await,
        },
        Request::Availability {
            category,
            start,
            end,
            exclude_reservation,
        } => {
            match scheduler
                .available(category, TimeRange { start, end }, exclude_reservation)
                .await
            {
                Ok(items) => Response::Items { items },
                Err(e) => error_response(e),
            }
        }
        Request::FreeWindows { item, start, end } => {
            match scheduler
                .item_free_windows(item, TimeRange { start, end })
                .await
            {
                Ok(windows) => Response::Windows { windows },
                Err(e) => error_response(e),
            }
        }
        Request::Reserve {
            items,
            holder,
            start,
            end,
            origin,
        } => {
            match scheduler
                .reserve(&items, &holder, TimeRange { start, end }, &origin)
                .await
            {
                Ok(reservations) => Response::Reservations { reservations },
                Err(e) => error_response(e),
            }
        }
        Request::Release { holder, origin } => match scheduler.release(&holder, &origin).await {
            Ok(count) => Response::Released { count },
            Err(e) => error_response(e),
        },
        Request::Transfer {
            from_holder,
            to_holder,
            origin,
        } => match scheduler.transfer(&from_holder, &to_holder, &origin).await {
            Ok(reservations) => Response::Reservations { reservations },
            Err(e) => error_response(e),
        },
        Request::TransferReservation {
            reservation,
            to_holder,
        } => {
            match scheduler
                .transfer_reservation(reservation, &to_holder)
                .await
            {
                Ok(reservation) => Response::Reservation { reservation },
                Err(e) => error_response(e),
            }
        }
        Request::ReplaceKit {
            holder,
            origin,
            items,
            start,
            end,
        } => {
            match scheduler
                .replace_kit(&holder, &origin, &items, TimeRange { start, end })
                .await
            {
                Ok(reservations) => Response::Reservations { reservations },
                Err(e) => error_response(e),
            }
        }
        Request::HolderView { task_id } => Response::View {
            holders: scheduler.holder_view(&task_id).await,
        },
        Request::ItemReservations { item } => match scheduler.reservations_for_item(item).await {
            Ok(reservations) => Response::Reservations { reservations },
            Err(e) => error_response(e),
        },
    }
}

type WireResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

async fn send(
    framed: &mut Framed<TcpStream, LinesCodec>,
    response: &Response,
) -> WireResult {
    framed.send(serde_json::to_string(response)?).await?;
    Ok(())
}

/// Drive one client connection: token handshake, then request/response with
/// optional interleaved subscription events.
pub async fn process_connection(
    socket: TcpStream,
    scheduler: Arc<Scheduler>,
    token: String,
) -> WireResult {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    // Handshake: first line must be a matching hello.
    match framed.next().await {
        Some(line) => {
            let ok = matches!(
                serde_json::from_str::<Request>(&line?),
                Ok(Request::Hello { token: t }) if t == token
            );
            if !ok {
                metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
                send(
                    &mut framed,
                    &Response::Error {
                        code: "unauthorized".into(),
                        message: "bad or missing hello".into(),
                    },
                )
                .await?;
                return Ok(());
            }
            send(&mut framed, &Response::Ok).await?;
        }
        None => return Ok(()),
    }

    let mut subscription: Option<broadcast::Receiver<LedgerEvent>> = None;

    loop {
        tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let line = line?;
                let req: Request = match serde_json::from_str(&line) {
                    Ok(req) => req,
                    Err(e) => {
                        send(&mut framed, &Response::Error {
                            code: "bad_request".into(),
                            message: format!("unparseable request: {e}"),
                        }).await?;
                        continue;
                    }
                };

                let op = observability::op_label(&req);
                let start = std::time::Instant::now();
                let response = match req {
                    Request::Subscribe { item } => {
                        subscription = Some(match item {
                            Some(id) => scheduler.notify.subscribe(id),
                            None => scheduler.notify.subscribe_all(),
                        });
                        Response::Subscribed
                    }
                    req => dispatch(&scheduler, req).await,
                };
                let status = match &response {
                    Response::Error { code, .. } => code.clone(),
                    _ => "ok".to_string(),
                };
                metrics::counter!(observability::OPS_TOTAL, "op" => op, "status" => status)
                    .increment(1);
                metrics::histogram!(observability::OP_DURATION_SECONDS, "op" => op)
                    .record(start.elapsed().as_secs_f64());
                send(&mut framed, &response).await?;
            }
            event = recv_event(&mut subscription) => {
                match event {
                    Some(event) => send(&mut framed, &Response::Event { event }).await?,
                    None => subscription = None,
                }
            }
        }
    }

    Ok(())
}

/// Await the next subscription event; pends forever when unsubscribed so the
/// select arm stays quiet. `None` means the channel closed (or the receiver
/// lagged past the buffer and the stream is no longer contiguous).
async fn recv_event(
    subscription: &mut Option<broadcast::Receiver<LedgerEvent>>,
) -> Option<LedgerEvent> {
    match subscription {
        Some(rx) => rx.recv().await.ok(),
        None => std::future::pending().await,
    }
}
