use crate::domain::charge::ChargeStatus;
use crate::domain::customer::{Customer, CustomerRequest};
use crate::error::GatewayError;
use crate::gateways::{
    to_minor_units, GatewayOrder, OrderMethod, OrderRequest, PaymentGateway, TransferDetails,
    VoucherDetails,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// in-memory gateway for tests: dedups orders by idempotency key the way a
// real provider does, and can be scripted to fail before succeeding
pub struct MockGateway {
    pub charge_status: Mutex<ChargeStatus>,
    scripted_errors: Mutex<VecDeque<GatewayError>>,
    customers_by_email: Mutex<HashMap<String, Customer>>,
    orders_by_key: Mutex<HashMap<String, GatewayOrder>>,
    orders_by_id: Mutex<HashMap<String, GatewayOrder>>,
    order_calls: AtomicUsize,
    customer_calls: AtomicUsize,
    next_order: AtomicUsize,
    find_misses: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::with_status(ChargeStatus::Paid)
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(status: ChargeStatus) -> Self {
        MockGateway {
            charge_status: Mutex::new(status),
            scripted_errors: Mutex::new(VecDeque::new()),
            customers_by_email: Mutex::new(HashMap::new()),
            orders_by_key: Mutex::new(HashMap::new()),
            orders_by_id: Mutex::new(HashMap::new()),
            order_calls: AtomicUsize::new(0),
            customer_calls: AtomicUsize::new(0),
            next_order: AtomicUsize::new(0),
            find_misses: AtomicUsize::new(0),
        }
    }

    // the next n customer lookups return nothing even when the customer
    // exists, mimicking provider read lag around concurrent creation
    pub fn miss_next_finds(&self, n: usize) {
        self.find_misses.store(n, Ordering::SeqCst);
    }

    pub fn script_error(&self, error: GatewayError) {
        self.scripted_errors.lock().unwrap().push_back(error);
    }

    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    pub fn customer_calls(&self) -> usize {
        self.customer_calls.load(Ordering::SeqCst)
    }

    pub fn created_orders(&self) -> usize {
        self.orders_by_id.lock().unwrap().len()
    }

    pub fn seed_customer(&self, customer: Customer) {
        self.customers_by_email
            .lock()
            .unwrap()
            .insert(customer.email.clone(), customer);
    }

    pub fn seed_order(&self, order: GatewayOrder) {
        self.orders_by_id
            .lock()
            .unwrap()
            .insert(order.order_id.clone(), order);
    }

    // pre-bind an order to an idempotency key, as a provider replaying an
    // earlier submission would
    pub fn seed_order_for_key(&self, idempotency_key: &str, order: GatewayOrder) {
        self.orders_by_key
            .lock()
            .unwrap()
            .insert(idempotency_key.to_string(), order.clone());
        self.orders_by_id
            .lock()
            .unwrap()
            .insert(order.order_id.clone(), order);
    }

    pub fn set_order_status(&self, order_id: &str, status: ChargeStatus) {
        if let Some(order) = self.orders_by_id.lock().unwrap().get_mut(order_id) {
            order.status = status;
        }
    }

    fn take_scripted_error(&self) -> Option<GatewayError> {
        self.scripted_errors.lock().unwrap().pop_front()
    }

    fn build_order(&self, request: &OrderRequest) -> GatewayOrder {
        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let status = self.charge_status.lock().unwrap().clone();
        let method = request.method.payment_method();

        let oxxo = match &request.method {
            OrderMethod::OxxoCash { expires_at } => Some(VoucherDetails {
                reference: format!("930001234567{n:02}"),
                barcode_url: Some(format!("https://mock.pay/barcode/{n}")),
                hosted_voucher_url: Some(format!("https://mock.pay/voucher/{n}")),
                expires_at: Some(*expires_at),
            }),
            _ => None,
        };

        let spei = match &request.method {
            OrderMethod::Spei { .. } => Some(TransferDetails {
                clabe: Some(format!("6461805278000000{n:02}")),
                reference: Some(format!("SPEI{n:06}")),
                bank: Some("STP".to_string()),
            }),
            _ => None,
        };

        GatewayOrder {
            order_id: format!("ord_mock_{n}"),
            charge_id: Some(format!("chg_mock_{n}")),
            status,
            amount_minor: to_minor_units(request.amount),
            currency: request.currency.clone(),
            payment_method: method,
            oxxo,
            spei,
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn find_customer(&self, email: &str) -> Result<Option<Customer>, GatewayError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_scripted_error() {
            return Err(error);
        }
        if self
            .find_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| m.checked_sub(1))
            .is_ok()
        {
            return Ok(None);
        }
        Ok(self
            .customers_by_email
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .map(|mut c| {
                c.existing = true;
                c
            }))
    }

    async fn create_customer(
        &self,
        request: &CustomerRequest,
        _idempotency_key: &str,
    ) -> Result<Customer, GatewayError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_scripted_error() {
            return Err(error);
        }
        let mut customers = self.customers_by_email.lock().unwrap();
        if let Some(found) = customers.get(&request.email) {
            return Err(GatewayError::AlreadyExists {
                id: found.id.clone(),
            });
        }
        let n = customers.len() + 1;
        let customer = Customer {
            id: format!("cus_mock_{n}"),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone().unwrap_or_default(),
            existing: false,
        };
        customers.insert(customer.email.clone(), customer.clone());
        Ok(customer)
    }

    async fn create_order(
        &self,
        request: &OrderRequest,
        idempotency_key: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_scripted_error() {
            return Err(error);
        }

        // provider-side idempotency: same key replays the original order
        if let Some(existing) = self.orders_by_key.lock().unwrap().get(idempotency_key) {
            return Ok(existing.clone());
        }

        let order = self.build_order(request);
        if order.status == ChargeStatus::Declined {
            return Err(GatewayError::Declined {
                code: "card_declined".to_string(),
                message: "mock decline".to_string(),
            });
        }

        self.orders_by_key
            .lock()
            .unwrap()
            .insert(idempotency_key.to_string(), order.clone());
        self.orders_by_id
            .lock()
            .unwrap()
            .insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        if let Some(error) = self.take_scripted_error() {
            return Err(error);
        }
        self.orders_by_id
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("unknown order {order_id}")))
    }
}
