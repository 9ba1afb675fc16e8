use super::*;
use async_trait::async_trait;
use courier_storage::implementations::memory::MemoryStorage;
use courier_storage::{Precondition, StorageError, StorageInterface, WriteOp};
use courier_types::{ConfigSchema, OrderStatus::*};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

const RESTAURANT: u64 = 7;
const DRIVER: u64 = 9;
const CUSTOMER: u64 = 42;
const MENU_ITEM: u64 = 501;

/// Memory store that can simulate a concurrent writer landing just before
/// the next commit, refuse every commit, or fail it outright.
#[derive(Default)]
struct Interference {
	inner: MemoryStorage,
	pending: Mutex<Option<(String, Vec<u8>)>>,
	always_conflict: AtomicBool,
	backend_down: AtomicBool,
	commits: AtomicU32,
}

impl Interference {
	fn inject<T: serde::Serialize>(&self, namespace: StorageKey, id: &str, value: &T) {
		let key = format!("{}:{}", namespace.as_str(), id);
		*self.pending.lock().unwrap() = Some((key, serde_json::to_vec(value).unwrap()));
	}
}

struct SharedStorage(Arc<Interference>);

#[async_trait]
impl StorageInterface for SharedStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.0.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.0.inner.set_bytes(key, value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.0.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.0.inner.exists(key).await
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		self.0.inner.list_keys(prefix).await
	}

	async fn commit(
		&self,
		preconditions: &[Precondition],
		writes: Vec<WriteOp>,
	) -> Result<(), StorageError> {
		self.0.commits.fetch_add(1, Ordering::SeqCst);
		if self.0.always_conflict.load(Ordering::SeqCst) {
			return Err(StorageError::Conflict("forced".into()));
		}
		if self.0.backend_down.load(Ordering::SeqCst) {
			return Err(StorageError::Backend("disk unavailable".into()));
		}
		let injected = self.0.pending.lock().unwrap().take();
		if let Some((key, value)) = injected {
			self.0.inner.set_bytes(&key, value).await?;
		}
		self.0.inner.commit(preconditions, writes).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.0.inner.config_schema()
	}
}

fn engine_with(backend: Box<dyn StorageInterface>, config: EngineConfig) -> OrderLifecycleEngine {
	OrderLifecycleEngine::new(
		config,
		Arc::new(StorageService::new(backend)),
		TransitionTable::standard(),
		EventBus::new(64),
	)
}

fn engine() -> OrderLifecycleEngine {
	engine_with(Box::new(MemoryStorage::new()), EngineConfig::default())
}

fn interfered_engine() -> (OrderLifecycleEngine, Arc<Interference>) {
	let shared = Arc::new(Interference::default());
	let engine = engine_with(
		Box::new(SharedStorage(shared.clone())),
		EngineConfig::default(),
	);
	(engine, shared)
}

fn restaurant() -> Principal {
	Principal::restaurant(RESTAURANT)
}

fn driver() -> Principal {
	Principal::driver(DRIVER)
}

fn customer() -> Principal {
	Principal::customer(CUSTOMER)
}

fn cart() -> Vec<CheckoutItem> {
	vec![CheckoutItem {
		menu_item_id: MENU_ITEM,
		quantity: 2,
	}]
}

async fn place(engine: &OrderLifecycleEngine) -> u64 {
	engine
		.register_menu_item(&restaurant(), RESTAURANT, MENU_ITEM, "Margherita", 1250)
		.await
		.unwrap();
	engine
		.place_order(&customer(), DeliveryLocation::Address("1 Main St".into()), &cart())
		.await
		.unwrap()
		.id
}

/// Walks an order along `path`, acting as whoever owns each step.
async fn advance(engine: &OrderLifecycleEngine, order_id: u64, path: &[OrderStatus]) {
	for &status in path {
		let actor = match ownership::Gate::for_target(status) {
			ownership::Gate::Restaurant => restaurant(),
			_ => driver(),
		};
		engine
			.request_transition(order_id, status, &actor, None)
			.await
			.unwrap_or_else(|e| panic!("moving to {} failed: {}", status, e));
		if status == Accepted {
			engine
				.assign_driver(&restaurant(), order_id, DRIVER)
				.await
				.unwrap();
		}
	}
}

async fn ready_order(engine: &OrderLifecycleEngine) -> u64 {
	let order_id = place(engine).await;
	advance(engine, order_id, &[Accepted, Preparing, ReadyForPickup]).await;
	order_id
}

#[tokio::test]
async fn test_restaurant_accepts_pending_order() {
	let engine = engine();
	let order_id = place(&engine).await;

	let outcome = engine
		.request_transition(order_id, Accepted, &restaurant(), Some("on it".into()))
		.await
		.unwrap();
	assert_eq!(outcome.previous_status, Pending);
	assert_eq!(outcome.new_status, Accepted);

	let view = engine.get_order_status(order_id).await.unwrap();
	assert_eq!(view.current_status, Accepted);
	assert_eq!(view.history.len(), 1);
	let record = &view.history[0];
	assert_eq!((record.from, record.to), (Pending, Accepted));
	assert_eq!(record.actor, restaurant());
	assert_eq!(record.id, outcome.record_id);
	assert_eq!(record.note.as_deref(), Some("on it"));
}

#[tokio::test]
async fn test_skipping_a_step_reports_allowed_next() {
	let engine = engine();
	let order_id = place(&engine).await;
	advance(&engine, order_id, &[Accepted]).await;

	let err = engine
		.request_transition(order_id, ReadyForPickup, &restaurant(), None)
		.await
		.unwrap_err();
	match err {
		EngineError::InvalidTransition {
			current,
			requested,
			allowed_next,
		} => {
			assert_eq!(current, Accepted);
			assert_eq!(requested, ReadyForPickup);
			assert_eq!(allowed_next, vec![Preparing, Cancelled]);
		},
		other => panic!("unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn test_unassigned_driver_is_forbidden() {
	let engine = engine();
	let order_id = place(&engine).await;
	engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap();
	engine
		.request_transition(order_id, Preparing, &restaurant(), None)
		.await
		.unwrap();

	let err = engine
		.request_transition(order_id, OnDelivery, &driver(), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn test_terminal_orders_reject_everything() {
	let engine = engine();
	let order_id = ready_order(&engine).await;
	advance(&engine, order_id, &[PickedUp, Completed]).await;
	let before = engine.get_order_status(order_id).await.unwrap();

	for actor in [Principal::admin(1), restaurant(), driver(), customer()] {
		for status in OrderStatus::ALL {
			match engine.request_transition(order_id, status, &actor, None).await {
				Err(EngineError::InvalidTransition { allowed_next, .. }) => {
					assert!(allowed_next.is_empty())
				},
				other => panic!("expected InvalidTransition, got {other:?}"),
			}
		}
	}

	let after = engine.get_order_status(order_id).await.unwrap();
	assert_eq!(before, after);
}

#[tokio::test]
async fn test_cancelled_is_final() {
	let engine = engine();
	let order_id = place(&engine).await;
	advance(&engine, order_id, &[Cancelled]).await;

	let err = engine
		.request_transition(order_id, Accepted, &Principal::admin(1), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_driver_picks_up_and_completes() {
	let engine = engine();
	let order_id = ready_order(&engine).await;
	let prior = engine.get_order_status(order_id).await.unwrap().history.len();

	engine
		.request_transition(order_id, PickedUp, &driver(), None)
		.await
		.unwrap();
	engine
		.request_transition(order_id, Completed, &driver(), None)
		.await
		.unwrap();

	let view = engine.get_order_status(order_id).await.unwrap();
	assert_eq!(view.history.len(), prior + 2);
	assert_eq!(view.current_status, Completed);
	assert_eq!(view.history.last().map(|r| r.to), Some(Completed));
	assert!(view.allowed_next.is_empty());
}

#[tokio::test]
async fn test_history_forms_a_path_from_pending() {
	let engine = engine();
	let order_id = ready_order(&engine).await;
	advance(&engine, order_id, &[OnDelivery, Delivered, Completed]).await;

	let view = engine.get_order_status(order_id).await.unwrap();
	let mut path = vec![Pending];
	for (i, record) in view.history.iter().enumerate() {
		assert_eq!(record.from, *path.last().unwrap());
		assert_eq!(record.sequence, i as u64 + 1);
		path.push(record.to);
	}
	assert!(engine.transition_table().is_lifecycle_path(&path));
	assert_eq!(path.last(), Some(&Completed));
}

#[tokio::test]
async fn test_repeated_request_is_rejected_without_duplicate_record() {
	let engine = engine();
	let order_id = place(&engine).await;

	engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap();
	let err = engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::InvalidTransition { current: Accepted, .. }));
	assert_eq!(engine.get_order_status(order_id).await.unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_forbidden_requests_leave_order_untouched() {
	let engine = engine();
	let order_id = ready_order(&engine).await;
	let before = engine.get_order_status(order_id).await.unwrap();

	let attempts = [
		(Principal::restaurant(99), Cancelled),
		(Principal::driver(99), PickedUp),
		(customer(), Cancelled),
		(restaurant(), OnDelivery),
		(driver(), Cancelled),
	];
	for (actor, status) in attempts {
		let err = engine
			.request_transition(order_id, status, &actor, None)
			.await
			.unwrap_err();
		assert!(
			matches!(err, EngineError::Forbidden(_)),
			"{actor} -> {status}: {err:?}"
		);
	}

	assert_eq!(engine.get_order_status(order_id).await.unwrap(), before);
}

#[tokio::test]
async fn test_ownership_is_checked_before_validity() {
	let engine = engine();
	let order_id = place(&engine).await;

	let err = engine
		.request_transition(order_id, Completed, &Principal::restaurant(99), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn test_admin_may_move_any_order() {
	let engine = engine();
	let order_id = place(&engine).await;
	let admin = Principal::admin(1);

	for status in [Accepted, Preparing, ReadyForPickup, OnDelivery] {
		engine
			.request_transition(order_id, status, &admin, None)
			.await
			.unwrap();
	}
	let view = engine.get_order_status(order_id).await.unwrap();
	assert_eq!(view.current_status, OnDelivery);
	assert!(view.history.iter().all(|r| r.actor == admin));
}

#[tokio::test]
async fn test_unknown_order() {
	let engine = engine();
	assert!(matches!(
		engine
			.request_transition(77, Accepted, &restaurant(), None)
			.await,
		Err(EngineError::OrderNotFound(77))
	));
	assert!(matches!(
		engine.get_order_status(77).await,
		Err(EngineError::OrderNotFound(77))
	));
}

#[tokio::test]
async fn test_status_change_is_published() {
	let engine = engine();
	let order_id = place(&engine).await;
	let mut events = engine.event_bus().subscribe();

	let outcome = engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap();

	match events.recv().await.unwrap() {
		CourierEvent::Order(OrderEvent::StatusChanged {
			order_id: id,
			from,
			to,
			record_id,
			..
		}) => {
			assert_eq!(id, order_id);
			assert_eq!((from, to), (Pending, Accepted));
			assert_eq!(record_id, outcome.record_id);
		},
		other => panic!("unexpected event: {other:?}"),
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_requests_never_both_succeed() {
	let engine = Arc::new(engine());

	for _ in 0..20 {
		let order_id = ready_order(&engine).await;
		let prior = engine.get_order_status(order_id).await.unwrap().history.len();

		let tasks = [OnDelivery, PickedUp].map(|status| {
			let engine = engine.clone();
			tokio::spawn(async move {
				engine
					.request_transition(order_id, status, &driver(), None)
					.await
			})
		});
		let mut results = Vec::new();
		for task in tasks {
			results.push(task.await.unwrap());
		}

		let successes = results.iter().filter(|r| r.is_ok()).count();
		assert_eq!(successes, 1, "{results:?}");
		for result in results.iter().filter_map(|r| r.as_ref().err()) {
			assert!(matches!(
				result,
				EngineError::ConcurrentModification { .. } | EngineError::InvalidTransition { .. }
			));
		}
		assert_eq!(
			engine.get_order_status(order_id).await.unwrap().history.len(),
			prior + 1
		);
	}
}

#[tokio::test]
async fn test_status_changed_underneath_is_a_conflict() {
	let (engine, storage) = interfered_engine();
	let order_id = place(&engine).await;

	let mut raced = engine.orders.load_order(order_id).await.unwrap().value;
	raced.status = Cancelled;
	raced.version += 1;
	storage.inject(StorageKey::Orders, &order_id.to_string(), &raced);

	let err = engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::ConcurrentModification { .. }));

	let view = engine.get_order_status(order_id).await.unwrap();
	assert_eq!(view.current_status, Cancelled);
	assert!(view.history.is_empty());
}

#[tokio::test]
async fn test_unrelated_race_is_retried() {
	let (engine, storage) = interfered_engine();
	let order_id = place(&engine).await;
	advance(&engine, order_id, &[Accepted, Preparing]).await;

	let reassigned = DeliveryAssignment {
		order_id,
		driver_id: 10,
		assigned_by: restaurant(),
		assigned_at: current_timestamp(),
	};
	storage.inject(StorageKey::Deliveries, &order_id.to_string(), &reassigned);
	let commits_before = storage.commits.load(Ordering::SeqCst);

	engine
		.request_transition(order_id, ReadyForPickup, &restaurant(), None)
		.await
		.unwrap();

	assert_eq!(storage.commits.load(Ordering::SeqCst) - commits_before, 2);
	let owner = engine.resolve_order_owner(order_id).await.unwrap();
	assert_eq!(owner.driver_id, Some(10));
	assert_eq!(
		engine.get_order_status(order_id).await.unwrap().current_status,
		ReadyForPickup
	);
}

#[tokio::test]
async fn test_retries_are_bounded() {
	let (engine, storage) = interfered_engine();
	let order_id = place(&engine).await;
	storage.always_conflict.store(true, Ordering::SeqCst);

	let err = engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap_err();
	match err {
		EngineError::ConcurrentModification { attempts, .. } => {
			assert_eq!(attempts, EngineConfig::default().max_transition_attempts)
		},
		other => panic!("unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn test_backend_failure_is_a_persistence_error() {
	let (engine, storage) = interfered_engine();
	let order_id = place(&engine).await;
	let before = engine.get_order_status(order_id).await.unwrap();
	let mut events = engine.event_bus().subscribe();
	storage.backend_down.store(true, Ordering::SeqCst);
	let commits = storage.commits.load(Ordering::SeqCst);

	let err = engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap_err();
	assert!(matches!(err, EngineError::Persistence(_)), "{err:?}");
	assert_eq!(storage.commits.load(Ordering::SeqCst) - commits, 1);

	storage.backend_down.store(false, Ordering::SeqCst);
	assert_eq!(engine.get_order_status(order_id).await.unwrap(), before);
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_huge_quantities_do_not_break_the_dashboard() {
	let engine = engine();
	place(&engine).await;
	let order = engine
		.place_order(
			&customer(),
			DeliveryLocation::Address("1 Main St".into()),
			&[
				CheckoutItem {
					menu_item_id: MENU_ITEM,
					quantity: u32::MAX,
				},
				CheckoutItem {
					menu_item_id: MENU_ITEM,
					quantity: 2,
				},
			],
		)
		.await
		.unwrap();

	let page = engine.list_actionable_orders(RESTAURANT, None, 1).await.unwrap();
	let summary = page.items.iter().find(|o| o.id == order.id).unwrap();
	assert_eq!(summary.item_count, u64::from(u32::MAX) + 2);
}

#[tokio::test]
async fn test_list_actionable_orders_pages_oldest_first() {
	let engine = engine_with(
		Box::new(MemoryStorage::new()),
		EngineConfig {
			page_size: 2,
			..EngineConfig::default()
		},
	);
	let first = place(&engine).await;
	let second = place(&engine).await;
	let third = place(&engine).await;
	advance(&engine, second, &[Accepted]).await;

	let page = engine.list_actionable_orders(RESTAURANT, None, 1).await.unwrap();
	assert_eq!(page.total, 3);
	assert_eq!(
		page.items.iter().map(|o| o.id).collect::<Vec<_>>(),
		vec![first, second]
	);
	let page = engine.list_actionable_orders(RESTAURANT, None, 2).await.unwrap();
	assert_eq!(page.items.iter().map(|o| o.id).collect::<Vec<_>>(), vec![third]);

	let pending = engine
		.list_actionable_orders(RESTAURANT, Some(Pending), 1)
		.await
		.unwrap();
	assert_eq!(pending.total, 2);
	assert!(pending.items.iter().all(|o| o.status == Pending));

	let other = engine.list_actionable_orders(99, None, 1).await.unwrap();
	assert_eq!(other.total, 0);

	assert!(matches!(
		engine.list_actionable_orders(RESTAURANT, None, 0).await,
		Err(EngineError::Validation(_))
	));
}

#[tokio::test]
async fn test_view_authorization() {
	let engine = engine();
	let order_id = place(&engine).await;

	engine.authorize_view(order_id, &customer()).await.unwrap();
	engine.authorize_view(order_id, &restaurant()).await.unwrap();
	assert!(matches!(
		engine.authorize_view(order_id, &driver()).await,
		Err(EngineError::Forbidden(_))
	));
	assert!(matches!(
		engine.authorize_view(order_id, &Principal::customer(1)).await,
		Err(EngineError::Forbidden(_))
	));

	advance(&engine, order_id, &[Accepted]).await;
	engine.authorize_view(order_id, &driver()).await.unwrap();
}

#[tokio::test]
async fn test_checkout_rules() {
	let engine = engine();
	engine
		.register_menu_item(&restaurant(), RESTAURANT, MENU_ITEM, "Margherita", 1250)
		.await
		.unwrap();
	engine
		.register_menu_item(&Principal::restaurant(8), 8, 600, "Pad Thai", 900)
		.await
		.unwrap();
	let location = DeliveryLocation::Coordinates { lat: 52.52, lng: 13.40 };

	let order = engine
		.place_order(&customer(), location.clone(), &cart())
		.await
		.unwrap();
	assert_eq!(order.status, Pending);
	assert_eq!(order.restaurant_id, RESTAURANT);
	assert_eq!(order.total(), 2500);

	let mixed = [
		cart()[0].clone(),
		CheckoutItem {
			menu_item_id: 600,
			quantity: 1,
		},
	];
	let cases: Vec<(Principal, DeliveryLocation, Vec<CheckoutItem>)> = vec![
		(customer(), location.clone(), vec![]),
		(customer(), DeliveryLocation::Address("  ".into()), cart()),
		(customer(), location.clone(), mixed.to_vec()),
		(
			customer(),
			location.clone(),
			vec![CheckoutItem {
				menu_item_id: MENU_ITEM,
				quantity: 0,
			}],
		),
	];
	for (actor, location, items) in cases {
		assert!(matches!(
			engine.place_order(&actor, location, &items).await,
			Err(EngineError::Validation(_))
		));
	}

	assert!(matches!(
		engine
			.place_order(
				&customer(),
				location.clone(),
				&[CheckoutItem {
					menu_item_id: 999,
					quantity: 1
				}]
			)
			.await,
		Err(EngineError::MenuItemNotFound(999))
	));
	assert!(matches!(
		engine.place_order(&restaurant(), location, &cart()).await,
		Err(EngineError::Forbidden(_))
	));
}

#[tokio::test]
async fn test_order_ids_are_sequential() {
	let engine = engine();
	let first = place(&engine).await;
	let second = place(&engine).await;
	assert_eq!(second, first + 1);
}

#[tokio::test]
async fn test_driver_assignment_rules() {
	let engine = engine();
	let order_id = place(&engine).await;

	assert!(matches!(
		engine.assign_driver(&restaurant(), order_id, DRIVER).await,
		Err(EngineError::Validation(_))
	));

	engine
		.request_transition(order_id, Accepted, &restaurant(), None)
		.await
		.unwrap();
	assert!(matches!(
		engine
			.assign_driver(&Principal::restaurant(99), order_id, DRIVER)
			.await,
		Err(EngineError::Forbidden(_))
	));

	let first = engine
		.assign_driver(&restaurant(), order_id, DRIVER)
		.await
		.unwrap();
	let again = engine
		.assign_driver(&restaurant(), order_id, DRIVER)
		.await
		.unwrap();
	assert_eq!(first, again);

	engine
		.assign_driver(&restaurant(), order_id, 10)
		.await
		.unwrap();
	assert!(matches!(
		engine
			.request_transition(order_id, Cancelled, &Principal::admin(1), None)
			.await,
		Ok(_)
	));
	assert_eq!(
		engine.resolve_order_owner(order_id).await.unwrap().driver_id,
		Some(10)
	);
}

#[tokio::test]
async fn test_menu_items_belong_to_one_restaurant() {
	let engine = engine();
	engine
		.register_menu_item(&restaurant(), RESTAURANT, MENU_ITEM, "Margherita", 1250)
		.await
		.unwrap();
	let renamed = engine
		.register_menu_item(&restaurant(), RESTAURANT, MENU_ITEM, "Marinara", 1100)
		.await
		.unwrap();
	assert_eq!(renamed.unit_price, 1100);

	assert!(matches!(
		engine
			.register_menu_item(&Principal::restaurant(8), 8, MENU_ITEM, "Stolen", 1)
			.await,
		Err(EngineError::Forbidden(_))
	));
	assert!(matches!(
		engine
			.register_menu_item(&restaurant(), 8, 700, "Not mine", 1)
			.await,
		Err(EngineError::Forbidden(_))
	));
	assert!(matches!(
		engine
			.register_menu_item(&restaurant(), RESTAURANT, 701, " ", 1)
			.await,
		Err(EngineError::Validation(_))
	));
}
