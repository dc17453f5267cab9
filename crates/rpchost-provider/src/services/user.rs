//! Account service backed by an in-memory user table.
//!
//! `Login` is answered on the worker that received it. `Register` takes the
//! table's write lock, so it runs on the service's task pool instead.

use rpchost_core::{Done, MethodDescriptor, Result, Service, TaskPool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// Status attached to every account response. `errcode` 0 means success.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResultCode {
    #[prost(int32, tag = "1")]
    pub errcode: i32,
    #[prost(string, tag = "2")]
    pub errmsg: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub pwd: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginResponse {
    #[prost(message, optional, tag = "1")]
    pub result: Option<ResultCode>,
    #[prost(bool, tag = "2")]
    pub success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegisterRequest {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub pwd: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegisterResponse {
    #[prost(message, optional, tag = "1")]
    pub result: Option<ResultCode>,
    #[prost(bool, tag = "2")]
    pub success: bool,
}

pub const ERR_BAD_CREDENTIALS: i32 = 1;
pub const ERR_NAME_TAKEN: i32 = 2;
pub const ERR_STORE_UNAVAILABLE: i32 = 3;

#[derive(Debug, Clone)]
struct Account {
    id: u32,
    pwd: String,
}

pub struct UserService {
    accounts: RwLock<HashMap<String, Account>>,
    pool: TaskPool,
}

impl UserService {
    pub fn new(pool_threads: usize, pool_capacity: usize) -> Result<Self> {
        Ok(Self {
            accounts: RwLock::new(HashMap::new()),
            pool: TaskPool::new("user-svc", pool_threads, pool_capacity)?,
        })
    }

    fn login(&self, req: &LoginRequest) -> ResultCode {
        let accounts = match self.accounts.read() {
            Ok(accounts) => accounts,
            Err(_) => return code(ERR_STORE_UNAVAILABLE, "account store unavailable"),
        };
        match accounts.get(&req.name) {
            Some(account) if account.pwd == req.pwd => {
                info!("login: {} (id {})", req.name, account.id);
                code(0, "")
            }
            _ => code(ERR_BAD_CREDENTIALS, "invalid name or password"),
        }
    }

    fn register(&self, req: &RegisterRequest) -> ResultCode {
        let mut accounts = match self.accounts.write() {
            Ok(accounts) => accounts,
            Err(_) => return code(ERR_STORE_UNAVAILABLE, "account store unavailable"),
        };
        if accounts.contains_key(&req.name) {
            return code(ERR_NAME_TAKEN, "name already registered");
        }
        accounts.insert(
            req.name.clone(),
            Account {
                id: req.id,
                pwd: req.pwd.clone(),
            },
        );
        info!("register: {} (id {})", req.name, req.id);
        code(0, "")
    }
}

fn code(errcode: i32, errmsg: &str) -> ResultCode {
    ResultCode {
        errcode,
        errmsg: errmsg.to_string(),
    }
}

impl Service for UserService {
    fn name(&self) -> &str {
        "UserServiceRpc"
    }

    fn methods(self: Arc<Self>) -> Vec<MethodDescriptor> {
        let login = self.clone();
        let register = self;
        vec![
            MethodDescriptor::new(
                "Login",
                move |req: LoginRequest, mut resp: LoginResponse, done| {
                    let result = login.login(&req);
                    resp.success = result.errcode == 0;
                    resp.result = Some(result);
                    done.complete(resp);
                },
            ),
            MethodDescriptor::new(
                "Register",
                move |req: RegisterRequest,
                      mut resp: RegisterResponse,
                      done: Done<RegisterResponse>| {
                    let service = register.clone();
                    let queued = register.pool.execute(move || {
                        let result = service.register(&req);
                        resp.success = result.errcode == 0;
                        resp.result = Some(result);
                        done.complete(resp);
                    });
                    if let Err(e) = queued {
                        error!("Register rejected: {}", e);
                    }
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_login() {
        let service = UserService::new(1, 4).unwrap();

        let registered = service.register(&RegisterRequest {
            id: 7,
            name: "zhang san".into(),
            pwd: "123456".into(),
        });
        assert_eq!(registered.errcode, 0);

        let ok = service.login(&LoginRequest {
            name: "zhang san".into(),
            pwd: "123456".into(),
        });
        assert_eq!(ok.errcode, 0);

        let bad = service.login(&LoginRequest {
            name: "zhang san".into(),
            pwd: "wrong".into(),
        });
        assert_eq!(bad.errcode, ERR_BAD_CREDENTIALS);
    }

    #[test]
    fn test_duplicate_name() {
        let service = UserService::new(1, 4).unwrap();
        let req = RegisterRequest {
            id: 1,
            name: "li si".into(),
            pwd: "pw".into(),
        };

        assert_eq!(service.register(&req).errcode, 0);
        let again = service.register(&req);
        assert_eq!(again.errcode, ERR_NAME_TAKEN);
        assert!(!again.errmsg.is_empty());
    }
}
