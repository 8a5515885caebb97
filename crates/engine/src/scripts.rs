//! JavaScript injected into audited pages.
//!
//! Instrumentation scripts are installed via
//! `Page.addScriptToEvaluateOnNewDocument` before navigation so they
//! observe the site's own load; audit scripts are evaluated after the
//! page has settled. All globals are prefixed `__audit_` to stay out of
//! the page's way.

/// Records the latest largest-contentful-paint candidate into
/// `window.__audit_lcp` (milliseconds since navigation start).
pub const LCP_OBSERVER_SCRIPT: &str = r#"(() => {
    window.__audit_lcp = 0;

    new PerformanceObserver((list) => {
        const entries = list.getEntries();
        if (entries.length > 0) {
            window.__audit_lcp = entries[entries.length - 1].startTime || 0;
        }
    }).observe({ type: 'largest-contentful-paint', buffered: true });
})();"#;

/// Buffers console errors/warnings, uncaught exceptions, unhandled
/// rejections and failed requests into `window.__audit_console_errors`
/// and `window.__audit_request_errors`.
pub const ERROR_CAPTURE_SCRIPT: &str = r#"(() => {
    window.__audit_console_errors = [];
    window.__audit_request_errors = [];

    // Resource load failures arrive as error events on the element;
    // everything else is an uncaught JS error.
    window.addEventListener('error', (e) => {
        if (e.target && (e.target.src || e.target.href)) {
            const detail = (e.target.src || e.target.href) + ' (type: ' + e.target.tagName + ')';
            window.__audit_request_errors.push('[Resource Load Failed]: ' + detail);
            return;
        }

        const detail = e.message + ' at ' + e.filename + ':' + e.lineno + ':' + e.colno +
            ' (' + (e.error && e.error.stack) + ')';
        window.__audit_console_errors.push('[Uncaught JS Error]: ' + detail);
    }, true);

    window.addEventListener('unhandledrejection', (e) => {
        const detail = (e.reason ? e.reason.message : 'Unknown') +
            ' (' + (e.reason && e.reason.stack) + ')';
        window.__audit_console_errors.push('[Unhandled Promise Rejection]: ' + detail);
    });

    const originalFetch = fetch;
    fetch = async function(...args) {
        try {
            const res = await originalFetch.apply(this, args);
            if (res.status >= 400) {
                window.__audit_request_errors.push('[HTTP Error]: ' + res.status + ' for ' + res.url);
            }
            return res;
        } catch (e) {
            window.__audit_request_errors.push('[HTTP Error]: ' + e.message + ' for ' + (args ? args[0] : ''));
            throw e;
        }
    };

    const originalOpen = XMLHttpRequest.prototype.open;
    const originalSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.open = function(method, url) {
        this.__audit_url = url;
        return originalOpen.apply(this, arguments);
    };
    XMLHttpRequest.prototype.send = function() {
        const xhr = this;

        function logFailure() {
            if (xhr.status >= 400 || xhr.status === 0) {
                window.__audit_request_errors.push('[HTTP Error]: ' + xhr.status + ' for ' + xhr.__audit_url);
            }
        }

        this.addEventListener('load', logFailure);
        this.addEventListener('error', logFailure);
        this.addEventListener('abort', logFailure);

        return originalSend.apply(this, arguments);
    };

    const originalConsoleError = console.error;
    console.error = (...args) => {
        window.__audit_console_errors.push('[Error]: ' + args.map(String).join(' '));
        originalConsoleError.apply(console, args);
    };

    const originalConsoleWarn = console.warn;
    console.warn = (...args) => {
        window.__audit_console_errors.push('[Warning]: ' + args.map(String).join(' '));
        originalConsoleWarn.apply(console, args);
    };
})();"#;

/// Mobile-responsiveness heuristics. Returns `{ issues: string[],
/// score: number }` where the score starts at 100 and each defect class
/// deducts a capped amount.
pub const RESPONSIVE_AUDIT_SCRIPT: &str = r#"(() => {
    const issues = [];
    let score = 100;

    const viewportTag = document.querySelector('meta[name="viewport"]');
    if (viewportTag) {
        const content = viewportTag.getAttribute('content') || '';
        if (!content.includes('width=device-width')) {
            issues.push('Viewport meta tag missing width attribute');
            score -= 25;
        }
    } else {
        issues.push('No viewport meta tag');
        score -= 30;
    }

    let hasMediaQueries = Array.from(document.styleSheets).some(sheet => {
        try {
            return Array.from(sheet.cssRules).some(rule => rule.type === CSSRule.MEDIA_RULE);
        } catch (e) {
            // cross-origin stylesheet access error
            return false;
        }
    });
    if (!hasMediaQueries) {
        hasMediaQueries = Array.from(document.querySelectorAll('link[rel="stylesheet"]'))
            .some(link => link.media && link.media !== 'all' && link.media !== '');
        if (!hasMediaQueries) {
            issues.push('No media queries in stylesheets');
            score -= 25;
        }
    }

    if (document.documentElement.scrollWidth > document.documentElement.clientWidth) {
        issues.push('Has horizontal scrollbar');
        score -= 25;
    }

    const overflowing = Array.from(document.querySelectorAll('*')).filter(el => {
        if (el.offsetParent === null) return false;
        return el.scrollWidth > (el.clientWidth + 5);
    }).length;
    if (overflowing > 0) {
        issues.push('Has horizontally overflowing elements');
        score -= Math.min(15, overflowing * 2);
    }

    const interactive = Array.from(
        document.querySelectorAll('a, button, input, select, textarea, [onclick], [role="button"]')
    );
    const smallTapTargets = interactive.filter(el => {
        if (el.offsetParent === null) return false;
        const rect = el.getBoundingClientRect();
        return (rect.width < 44 || rect.height < 44) && rect.width > 0 && rect.height > 0;
    }).length;
    if (smallTapTargets > 0) {
        issues.push('Has small tap targets');
        score -= Math.min(12, smallTapTargets * 1.2);
    }
    const crowdedTapTargets = interactive.filter(el => {
        if (el.offsetParent === null) return false;
        const rect = el.getBoundingClientRect();
        const nearby = document.elementsFromPoint(rect.x + rect.width / 2, rect.y + rect.height + 8);
        return nearby.some(n =>
            n !== el &&
            interactive.includes(n) &&
            n.getBoundingClientRect().y < rect.y + rect.height + 16
        );
    }).length;
    if (crowdedTapTargets > 0) {
        issues.push('Has crowded tap targets');
        score -= Math.min(6, crowdedTapTargets * 0.6);
    }

    const inflexibleImages = Array.from(document.querySelectorAll('img')).filter(img => {
        if (img.offsetParent === null) return false;
        const style = window.getComputedStyle(img);
        const rect = img.getBoundingClientRect();
        return rect.width > window.innerWidth &&
            style.maxWidth === 'none' && !style.width.includes('%');
    }).length;
    if (inflexibleImages > 0) {
        issues.push('Has non flexible images');
        score -= Math.min(9, inflexibleImages * 1.8);
    }

    const smallText = Array.from(
        document.querySelectorAll('p, h1, h2, h3, h4, h5, h6, span, a, li, td, th')
    ).filter(el => {
        if (el.offsetParent === null || !el.textContent.trim()) return false;
        return parseFloat(window.getComputedStyle(el).fontSize) < 12;
    }).length;
    if (smallText > 0) {
        issues.push('Has small text');
        score -= Math.min(9, smallText * 1.2);
    }

    const hasFlexibleLayout = Array.from(document.querySelectorAll(
        'main, .container, .wrapper, header, nav, section, article, aside, footer'
    )).some(el => {
        if (el.offsetParent === null) return false;
        const style = window.getComputedStyle(el);
        return style.display.includes('flex') ||
            style.display.includes('grid') ||
            style.display === 'block' && (
                style.maxWidth.includes('%') ||
                style.width.includes('%') ||
                style.width === 'auto'
            );
    });
    if (!hasFlexibleLayout) {
        issues.push('No flexible layout patterns');
        score -= 10;
    }

    return { issues: issues, score: Math.max(0, Math.round(score)) };
})()"#;

/// Form accessibility and semantics scan. Returns an array of
/// human-readable findings, each naming the offending form/input.
pub const FORM_AUDIT_SCRIPT: &str = r#"(() => {
    const issues = [];

    document.querySelectorAll('form').forEach((form, formIndex) => {
        const formSelector = form.id ?
            'form#' + form.id :
            'form:nth-of-type(' + (formIndex + 1) + ')';

        const formAction = form.getAttribute('action') || form.getAttribute('onsubmit');
        const formMethod = (form.getAttribute('method') || 'get').toLowerCase();
        const hasJsHandler = form.hasAttribute('data-action') || form.hasAttribute('ng-submit') ||
            form.hasAttribute('v-on:submit') || form.hasAttribute('@submit');
        const hasHtmxHandler = form.hasAttribute('hx-get') || form.hasAttribute('hx-post') ||
            form.hasAttribute('hx-put') || form.hasAttribute('hx-patch') || form.hasAttribute('hx-delete');

        if (!formAction && !hasJsHandler && !hasHtmxHandler) {
            issues.push(formSelector + ' is missing action attribute or JavaScript submit handler');
        }

        const hasFileInput = !!form.querySelector('input[type="file"]');
        const hasPasswordInput = !!form.querySelector('input[type="password"]');
        const hasLargeTextarea = Array.from(form.querySelectorAll('textarea'))
            .some(textarea => textarea.value.length > 2000);

        if (formMethod === 'get' && (hasFileInput || hasPasswordInput || hasLargeTextarea)) {
            issues.push(formSelector + ' should use POST method for sensitive or large data submission');
        }

        if (hasFileInput && form.getAttribute('enctype') !== 'multipart/form-data') {
            issues.push(formSelector + " is missing proper enctype='multipart/form-data'");
        }

        if (formMethod !== 'get') {
            const csrfTokens = form.querySelectorAll(
                'input[name*="csrf"], input[name*="token"], input[name="_token"], input[name="authenticity_token"]'
            );
            if (csrfTokens.length === 0) {
                issues.push(formSelector + ' uses ' + formMethod.toUpperCase() +
                    ' but appears to be missing CSRF protection');
            }
        }

        const hasSubmitButton = !!form.querySelector('button[type="submit"], input[type="submit"]');
        if (!hasSubmitButton) {
            issues.push(formSelector + ' is missing a submit button');
        }

        const seenIds = new Set();
        Array.from(form.querySelectorAll('[id]')).forEach(el => {
            if (seenIds.has(el.id)) {
                issues.push(formSelector + ' has duplicate IDs (' + el.id + ')');
            } else {
                seenIds.add(el.id);
            }
        });

        const inputs = form.querySelectorAll(
            'input:not([type="hidden"]):not([type="submit"]), select, textarea'
        );
        inputs.forEach((input, inputIndex) => {
            const tag = input.tagName.toLowerCase();
            const inputSelector = input.id ? tag + '#' + input.id :
                input.name ?
                    tag + '[name="' + input.name + '"]' :
                    tag + ':nth-of-type(' + (inputIndex + 1) + ')';

            const hasLabel = input.id ?
                !!document.querySelector('label[for="' + input.id + '"]') :
                input.closest('label') !== null;
            if (!hasLabel) {
                issues.push(inputSelector + ' (in ' + formSelector + ') lacks associated label');
            }

            if (!input.name && input.type !== 'button' && input.type !== 'submit') {
                issues.push(inputSelector + ' (in ' + formSelector +
                    ') is missing name attribute (required for form submission)');
            }

            if (input.type === 'text' && input.name) {
                const name = input.name.toLowerCase();
                if (name.includes('email') || name.includes('tel')) {
                    issues.push(inputSelector + ' (in ' + formSelector + ') has incorrect type');
                }
            }

            if (!input.getAttribute('aria-label') && !input.getAttribute('aria-labelledby') && !hasLabel) {
                issues.push(inputSelector + ' (in ' + formSelector + ') lacks accessible name');
            }

            if (input.type === 'password' && window.location.protocol !== 'https:') {
                issues.push(inputSelector + ' (in ' + formSelector +
                    ') is a password field not served over HTTPS');
            }

            if (input.required) {
                const hasValidation = input.hasAttribute('pattern') ||
                    input.hasAttribute('min') || input.hasAttribute('max') ||
                    input.hasAttribute('minlength') || input.hasAttribute('maxlength') ||
                    input.type === 'email' || input.type === 'url' ||
                    input.type === 'number' || input.type === 'date';

                if (!hasValidation && input.type === 'text') {
                    issues.push(inputSelector + ' (in ' + formSelector + ') has no validation');
                }
            }
        });
    });

    return issues;
})()"#;

/// Tech-stack fingerprinting: global objects, DOM markers, generator
/// meta tags and asset-path signatures, matched against a fixed catalog
/// of known frameworks, platforms and libraries.
pub const TECH_STACK_SCRIPT: &str = r#"(() => {
    const detected = [];
    const add = (name) => { if (!detected.includes(name)) detected.push(name); };

    const generator = (() => {
        const tag = document.querySelector('meta[name="generator"]');
        return tag ? (tag.getAttribute('content') || '').toLowerCase() : '';
    })();
    const assets = Array.from(document.querySelectorAll('script[src], link[href]'))
        .map(el => el.src || el.href)
        .join(' ');

    if (window.React || document.querySelector('[data-reactroot], [data-reactid]')) add('React');
    if (window.__NEXT_DATA__ || document.querySelector('#__next')) add('Next.js');
    if (window.Vue || window.__VUE__ || document.querySelector('[data-v-app]')) add('Vue.js');
    if (window.__NUXT__ || document.querySelector('#__nuxt')) add('Nuxt');
    if (document.querySelector('[ng-version]')) add('Angular');
    if (window.angular) add('AngularJS');
    if (window.Ember) add('Ember.js');
    if (document.querySelector('[class*="svelte-"]')) add('Svelte');
    if (window.jQuery) add('jQuery');
    if (window.htmx) add('htmx');
    if (window.Alpine) add('Alpine.js');

    if (generator.includes('wordpress') || assets.includes('wp-content') || assets.includes('wp-includes')) add('WordPress');
    if (generator.includes('drupal')) add('Drupal');
    if (generator.includes('joomla')) add('Joomla');
    if (window.Shopify || assets.includes('cdn.shopify.com')) add('Shopify');
    if (generator.includes('wix') || window.wixBiSession || assets.includes('parastorage.com')) add('Wix');
    if (window.Static && window.Static.SQUARESPACE_CONTEXT) add('Squarespace');
    if (window.Weebly) add('Weebly');
    if (document.querySelector('[data-elementor-type]')) add('Elementor');

    if (window.bootstrap || assets.includes('bootstrap')) add('Bootstrap');
    if (assets.includes('tailwind')) add('Tailwind CSS');
    if (window.gsap) add('GSAP');
    if (window.dataLayer || window.gtag || window.ga) add('Google Analytics');
    if (window.fbq) add('Meta Pixel');

    return detected;
})()"#;
