//! Local operator console: serves guarded pages backed by the REST API
//!
//! Run with `VERSO_API=http://localhost:8080/api cargo run --example console`

use salvo::prelude::*;
use verso_session::{
    visible_items, GuardHandler, HttpBackend, NavItem, Role, RouteGuard, SessionConfig,
    SessionDepotExt, SessionError, SessionStore,
};

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn login_form(action: &str, error: Option<&str>) -> String {
    let action = html_escape(action);
    let error = error
        .map(|msg| format!("<p class=\"error\">{}</p>", html_escape(msg)))
        .unwrap_or_default();
    format!(
        "<h1>Intranet - Volquetes Escalante</h1>{}\
         <form method=\"post\" action=\"{}\">\
         <input name=\"username\" placeholder=\"Usuario\" required>\
         <input name=\"password\" type=\"password\" placeholder=\"Contraseña\" required>\
         <button type=\"submit\">Entrar</button></form>",
        error, action
    )
}

fn login_action(req: &Request) -> String {
    match req.uri().query() {
        Some(query) => format!("/login?{}", query),
        None => "/login".to_string(),
    }
}

#[handler]
async fn show_login(req: &mut Request, res: &mut Response) {
    res.render(Text::Html(login_form(&login_action(req), None)));
}

struct SubmitLogin {
    store: SessionStore<HttpBackend>,
    guard: RouteGuard,
}

#[async_trait]
impl Handler for SubmitLogin {
    async fn handle(&self, req: &mut Request, _depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let action = login_action(req);
        let query = req.uri().query().map(str::to_string);
        let username = req.form::<String>("username").await.unwrap_or_default();
        let password = req.form::<String>("password").await.unwrap_or_default();

        match self.store.login(&username, &password).await {
            Ok(_) => res.render(Redirect::found(self.guard.return_target(query.as_deref()))),
            Err(e) => {
                res.status_code(StatusCode::UNAUTHORIZED);
                res.render(Text::Html(login_form(&action, Some(&e.user_message()))));
            }
        }
    }
}

struct Logout {
    store: SessionStore<HttpBackend>,
}

#[async_trait]
impl Handler for Logout {
    async fn handle(&self, _req: &mut Request, _depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let route = self.store.logout().await.to_string();
        res.render(Redirect::found(route));
    }
}

struct Page {
    title: &'static str,
    nav: Vec<NavItem>,
}

#[async_trait]
impl Handler for Page {
    async fn handle(&self, _req: &mut Request, depot: &mut Depot, res: &mut Response, _ctrl: &mut FlowCtrl) {
        let user = depot.current_user();
        let links: String = visible_items(&self.nav, user)
            .iter()
            .map(|item| {
                format!(
                    "<li><a href=\"{}\">{}</a></li>",
                    html_escape(&item.path),
                    html_escape(&item.label)
                )
            })
            .collect();
        let who = user
            .map(|u| html_escape(&format!("{} ({})", u.display_name(), u.role())))
            .unwrap_or_default();
        res.render(Text::Html(format!(
            "<nav><ul>{}</ul></nav><p>{}</p><h1>{}</h1>\
             <form method=\"post\" action=\"/logout\"><button>Salir</button></form>",
            links, who, self.title
        )));
    }
}

#[tokio::main]
async fn main() -> Result<(), SessionError> {
    tracing_subscriber::fmt::init();

    let config = match std::env::var("VERSO_API") {
        Ok(url) => SessionConfig::new(url),
        Err(_) => SessionConfig::default(),
    };
    let store = SessionStore::new(HttpBackend::new(config.clone())?, config);
    let guard = RouteGuard::new(store.config()).with_rule("/configuracion", vec![Role::Admin]);

    tokio::spawn({
        let store = store.clone();
        async move {
            let _ = store.check_session().await;
        }
    });

    let page = |title| Page {
        title,
        nav: NavItem::sidebar(),
    };

    let router = Router::new()
        .push(
            Router::with_path("login").get(show_login).post(SubmitLogin {
                store: store.clone(),
                guard: guard.clone(),
            }),
        )
        .push(
            Router::new()
                .hoop(GuardHandler::new(&store, guard))
                .get(page("Dashboard"))
                .push(Router::with_path("orders").get(page("Órdenes")))
                .push(Router::with_path("configuracion").get(page("Configuración")))
                .push(Router::with_path("logout").post(Logout { store })),
        );

    let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
    Server::new(acceptor).serve(router).await;
    Ok(())
}
