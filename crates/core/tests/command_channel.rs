// Command channel requests as a content script would send them.

mod harness;

use std::time::Duration;

use harness::{Harness, settle};
use serde_json::json;
use tabwright::{ChannelRequest, ChannelResponse, ChannelServer, Context, ContextId, Error, MessageSender, Purpose, SessionId, SessionState};

const ORIGIN_URL: &str = "https://jobs.example.com/apply/1234";
const GOOGLE_LOGIN: &str = "https://accounts.google.com/o/oauth2/v2/auth?client_id=abc";

fn started_id(response: ChannelResponse) -> SessionId {
	match response {
		ChannelResponse::Started { session_id } => session_id,
		other => panic!("expected a session id, got {other:?}"),
	}
}

#[tokio::test(start_paused = true)]
async fn session_start_is_idempotent_per_sender() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let (client, _server) = ChannelServer::spawn(h.orchestrator.clone());
	let sender = MessageSender::context(10);

	let first = started_id(
		client
			.request(sender.clone(), ChannelRequest::SessionStart { purpose: Purpose::ExternalForm })
			.await
			.unwrap(),
	);
	let second = started_id(client.request(sender, ChannelRequest::SessionStart { purpose: Purpose::Oauth }).await.unwrap());

	assert_eq!(first, second);
	assert_eq!(h.orchestrator.sessions().len(), 1);
	assert_eq!(h.count("session-started"), 1);
}

#[tokio::test(start_paused = true)]
async fn requests_without_sender_context_are_rejected() {
	let h = Harness::new();
	let sender = MessageSender::default();

	let response = h.orchestrator.handle_command(&sender, ChannelRequest::SessionStart { purpose: Purpose::Oauth }).await;
	assert_eq!(response, ChannelResponse::error("No sender tab"));

	let response = h.orchestrator.handle_command(&sender, ChannelRequest::HandleOauth { provider: None }).await;
	assert_eq!(response, ChannelResponse::failure("No sender tab"));
}

#[tokio::test(start_paused = true)]
async fn start_for_unknown_context_reports_error() {
	let h = Harness::new();
	let response = h
		.orchestrator
		.handle_command(&MessageSender::context(77), ChannelRequest::SessionStart { purpose: Purpose::Oauth })
		.await;
	assert_eq!(response, ChannelResponse::error("Context 77 not found"));
}

#[tokio::test(start_paused = true)]
async fn get_session_defaults_to_sender_context() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let session = h.orchestrator.start(10, Purpose::DocumentUpload).await.unwrap();
	h.host.open(Context::new(11, 1, "https://upload.example.com").with_opener(10));
	settle().await;

	let from_child = h.orchestrator.handle_command(&MessageSender::context(11), ChannelRequest::GetSession { session_id: None }).await;
	match from_child {
		ChannelResponse::Session { session: Some(found) } => assert_eq!(found.id, session.id),
		other => panic!("unexpected response: {other:?}"),
	}

	let by_id = h
		.orchestrator
		.handle_command(
			&MessageSender::default(),
			ChannelRequest::GetSession {
				session_id: Some(session.id.clone()),
			},
		)
		.await;
	assert!(matches!(by_id, ChannelResponse::Session { session: Some(_) }));

	let stranger = h.orchestrator.handle_command(&MessageSender::context(99), ChannelRequest::GetSession { session_id: None }).await;
	assert_eq!(stranger, ChannelResponse::session(None));
}

#[tokio::test(start_paused = true)]
async fn lifecycle_commands_answer_success_and_are_idempotent() {
	let h = Harness::new().with_origin(10, ORIGIN_URL).with_origin(20, ORIGIN_URL);
	let sender = MessageSender::context(10);
	let completed = h.orchestrator.start(10, Purpose::Unknown).await.unwrap();
	let cancelled = h.orchestrator.start(20, Purpose::Unknown).await.unwrap();

	for _ in 0..2 {
		let response = h
			.orchestrator
			.handle_command(
				&sender,
				ChannelRequest::SessionComplete {
					session_id: completed.id.clone(),
				},
			)
			.await;
		assert_eq!(response, ChannelResponse::ok());
	}
	let response = h
		.orchestrator
		.handle_command(
			&sender,
			ChannelRequest::SessionFail {
				session_id: completed.id.clone(),
				reason: "too late".to_string(),
			},
		)
		.await;
	assert_eq!(response, ChannelResponse::ok());
	assert_eq!(h.orchestrator.session(&completed.id).unwrap().state, SessionState::Completed);

	let response = h
		.orchestrator
		.handle_command(
			&MessageSender::context(20),
			ChannelRequest::SessionCancel {
				session_id: cancelled.id.clone(),
			},
		)
		.await;
	assert_eq!(response, ChannelResponse::ok());
	assert_eq!(h.orchestrator.session(&cancelled.id).unwrap().state, SessionState::Cancelled);
	assert_eq!(h.count("session-completed"), 1);
	assert_eq!(h.count("session-cancelled"), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_open_prepares_session_for_the_spawn() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let sender = MessageSender::context(10);

	let response = h
		.orchestrator
		.handle_command(
			&sender,
			ChannelRequest::PendingOpen {
				reason: "Sign in with Google".to_string(),
			},
		)
		.await;
	assert_eq!(response, ChannelResponse::ok());

	let session = h.orchestrator.session_anchored_at(10).unwrap();
	assert_eq!(session.purpose, Purpose::Oauth);
	assert_eq!(session.timeout_ms, 120_000);

	h.host.open(Context::new(11, 1, GOOGLE_LOGIN).with_opener(10));
	settle().await;
	assert_eq!(h.orchestrator.session(&session.id).unwrap().child_ids(), vec![ContextId(11)]);

	let again = h
		.orchestrator
		.handle_command(
			&sender,
			ChannelRequest::PendingOpen {
				reason: "Sign in with Google".to_string(),
			},
		)
		.await;
	assert_eq!(again, ChannelResponse::ok());
	assert_eq!(h.orchestrator.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_resolves_when_popup_authorizes() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let (client, _server) = ChannelServer::spawn(h.orchestrator.clone());

	let pending = tokio::spawn(async move {
		client
			.request(
				MessageSender::context(10),
				ChannelRequest::HandleOauth {
					provider: Some("Google".to_string()),
				},
			)
			.await
	});
	settle().await;

	let session = h.orchestrator.session_anchored_at(10).unwrap();
	assert_eq!(session.state, SessionState::Waiting);
	assert_eq!(session.provider.as_deref(), Some("google"));

	h.host.open(Context::new(11, 1, GOOGLE_LOGIN).with_opener(10));
	settle().await;
	h.host.navigate(11, "https://jobs.example.com/oauth/callback?code=xyz");

	let response = pending.await.unwrap().unwrap();
	assert_eq!(response, ChannelResponse::ok());
	assert_eq!(h.orchestrator.session(&session.id).unwrap().state, SessionState::Completed);
	assert_eq!(h.count("session-completed"), 1);
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_ignores_unrelated_children() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let session = h.orchestrator.start(10, Purpose::ExternalForm).await.unwrap();
	h.host.open(Context::new(11, 1, "https://boards.greenhouse.io/acme/jobs/1").with_opener(10));
	settle().await;

	let orchestrator = h.orchestrator.clone();
	let pending = tokio::spawn(async move {
		orchestrator
			.handle_command(
				&MessageSender::context(10),
				ChannelRequest::HandleOauth {
					provider: Some("google".to_string()),
				},
			)
			.await
	});
	settle().await;
	h.host.open(Context::new(12, 1, GOOGLE_LOGIN).with_opener(10));
	settle().await;

	h.host.close(11);
	tokio::time::sleep(Duration::from_secs(2)).await;
	assert!(!pending.is_finished());
	assert_eq!(h.orchestrator.session(&session.id).unwrap().state, SessionState::Waiting);
	assert!(h.host.context(12).is_some());

	h.host.navigate(12, "https://jobs.example.com/oauth/callback?code=abc");
	let response = pending.await.unwrap();
	assert_eq!(response, ChannelResponse::ok());
	assert_eq!(h.orchestrator.session(&session.id).unwrap().state, SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_reuses_an_open_provider_popup() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let session = h.orchestrator.start(10, Purpose::Unknown).await.unwrap();
	h.host.open(Context::new(11, 1, GOOGLE_LOGIN).with_opener(10));
	settle().await;

	let orchestrator = h.orchestrator.clone();
	let pending = tokio::spawn(async move {
		orchestrator
			.handle_command(&MessageSender::context(10), ChannelRequest::HandleOauth { provider: None })
			.await
	});
	settle().await;
	h.host.navigate(11, "https://jobs.example.com/oauth/callback?code=abc");

	assert_eq!(pending.await.unwrap(), ChannelResponse::ok());
	assert_eq!(h.orchestrator.session(&session.id).unwrap().state, SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn pending_open_attributes_popup_without_opener() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let response = h
		.orchestrator
		.handle_command(
			&MessageSender::context(10),
			ChannelRequest::PendingOpen {
				reason: "Sign in with Google".to_string(),
			},
		)
		.await;
	assert_eq!(response, ChannelResponse::ok());

	h.host.open(Context::new(11, 1, GOOGLE_LOGIN));
	settle().await;

	let session = h.orchestrator.session_anchored_at(10).unwrap();
	assert_eq!(session.child_ids(), vec![ContextId(11)]);
	assert_eq!(session.provider.as_deref(), Some("google"));
	assert_eq!(h.count("oauth-detected"), 1);

	h.host.open(Context::new(12, 1, "https://news.example.com"));
	settle().await;
	assert_eq!(h.orchestrator.session(&session.id).unwrap().child_ids(), vec![ContextId(11)]);
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_reports_denial() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let orchestrator = h.orchestrator.clone();
	let pending = tokio::spawn(async move {
		orchestrator
			.handle_command(&MessageSender::context(10), ChannelRequest::HandleOauth { provider: None })
			.await
	});
	settle().await;

	h.host.open(Context::new(11, 1, GOOGLE_LOGIN).with_opener(10));
	settle().await;
	h.host.navigate(11, "https://jobs.example.com/oauth/callback?error=access_denied");

	let response = pending.await.unwrap();
	assert_eq!(response, ChannelResponse::failure("Authorization denied by google"));
	assert!(!response.is_success());
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_without_popup_fails_after_new_context_deadline() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let orchestrator = h.orchestrator.clone();
	let pending = tokio::spawn(async move {
		orchestrator
			.handle_command(
				&MessageSender::context(10),
				ChannelRequest::HandleOauth {
					provider: Some("linkedin".to_string()),
				},
			)
			.await
	});

	tokio::time::sleep(Duration::from_secs(31)).await;
	let response = pending.await.unwrap();
	assert_eq!(response, ChannelResponse::failure("Timed out after 30000ms waiting for a context opened from 10"));

	let session = h.orchestrator.sessions().pop().unwrap();
	assert_eq!(session.state, SessionState::Failed);
	assert_eq!(h.orchestrator.armed_watchdogs(), 0);
}

#[tokio::test(start_paused = true)]
async fn handle_oauth_answers_when_session_is_cancelled_elsewhere() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let orchestrator = h.orchestrator.clone();
	let pending = tokio::spawn(async move {
		orchestrator
			.handle_command(&MessageSender::context(10), ChannelRequest::HandleOauth { provider: None })
			.await
	});
	settle().await;

	let session = h.orchestrator.session_anchored_at(10).unwrap();
	assert!(h.orchestrator.cancel(&session.id).await);

	let response = pending.await.unwrap();
	assert_eq!(response, ChannelResponse::failure("Session cancelled"));
}

#[tokio::test(start_paused = true)]
async fn raw_json_messages_are_decoded_and_validated() {
	let h = Harness::new().with_origin(10, ORIGIN_URL);
	let sender = MessageSender::context(10);

	let response = h.orchestrator.handle_json(&sender, json!({ "type": "SESSION_START", "purpose": "external-form" })).await;
	let session_id = response["sessionId"].as_str().unwrap().to_string();
	assert!(session_id.starts_with("session-"));

	let response = h.orchestrator.handle_json(&sender, json!({ "type": "GET_SESSION" })).await;
	assert_eq!(response["session"]["id"], session_id);
	assert_eq!(response["session"]["purpose"], "external-form");
	assert_eq!(response["session"]["state"], "active");

	let response = h.orchestrator.handle_json(&sender, json!({ "type": "SELF_DESTRUCT" })).await;
	assert!(response["error"].as_str().unwrap().starts_with("Invalid request"));

	let response = h.orchestrator.handle_json(&sender, json!({ "type": "SESSION_COMPLETE", "sessionId": session_id })).await;
	assert_eq!(response, json!({ "success": true }));
}

#[tokio::test(start_paused = true)]
async fn client_reports_closed_channel() {
	let h = Harness::new();
	let (client, server) = ChannelServer::spawn(h.orchestrator.clone());
	server.abort();
	let _ = server.await;

	let err = client
		.request(MessageSender::context(1), ChannelRequest::GetSession { session_id: None })
		.await
		.unwrap_err();
	assert!(matches!(err, Error::ChannelClosed));
}
